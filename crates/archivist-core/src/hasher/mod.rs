pub mod identity;

pub use identity::{FileIdentity, Sha256Hash};
