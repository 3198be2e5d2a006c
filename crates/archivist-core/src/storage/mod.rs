pub mod archives;
pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{Archive, ArchiveDestination, ContentEntry, StorageRecord, Volume};
pub use sqlite::Database;
