pub mod analysis;
pub mod archive;
pub mod config;
pub mod engine;
pub mod error;
pub mod hasher;
pub mod platform;
pub mod report;
pub mod scanner;
pub mod storage;

pub use analysis::DuplicateQueryEngine;
pub use archive::{ArchiveRouter, RoutingStats};
pub use config::AppConfig;
pub use engine::{attach_volumes, AttachedVolume, ScanEngine, VolumeScanOutcome, VolumeScanResult};
pub use error::Error;
pub use hasher::{FileIdentity, Sha256Hash};
pub use platform::volumes::{ConfiguredVolumes, VolumeDescriptor, VolumeSupplier};
pub use report::{RecordingReporter, ReportEvent, Reporter, SilentReporter};
pub use storage::Database;
