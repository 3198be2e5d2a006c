use crate::archive::ArchivePattern;
use crate::hasher::{FileIdentity, Sha256Hash};

/// A storage device, keyed by a stable device identifier. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub id: i64,
    pub device_id: String,
    pub label: String,
    pub total_space: i64,
    pub free_space: i64,
    pub should_scan: bool,
    pub last_scan: Option<i64>,
    /// Set while a scan is running; still set afterwards means the scan was interrupted.
    pub dirty: bool,
}

/// Content-addressing key: one row per distinct (size, short hash, full hash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    pub id: i64,
    pub size: i64,
    pub short_hash: Sha256Hash,
    pub hash: Sha256Hash,
}

impl ContentEntry {
    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(self.size as u64, self.short_hash, self.hash)
    }
}

/// One concrete file instance: a name in a directory on a volume, joined with its content entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRecord {
    pub id: i64,
    pub content_entry_id: i64,
    pub size: i64,
    pub short_hash: Sha256Hash,
    pub hash: Sha256Hash,
    pub volume_id: i64,
    pub location_id: i64,
    pub path: String,
    pub file_name: String,
    /// On-disk last-modified time, unix seconds.
    pub modified_at: i64,
    /// When a scan last confirmed the file, unix seconds.
    pub last_seen: i64,
}

impl StorageRecord {
    pub fn identity(&self) -> FileIdentity {
        FileIdentity::new(self.size as u64, self.short_hash, self.hash)
    }

    /// `path/file_name`, the key the interactive resolver sorts by.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.path, self.file_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDestination {
    pub location_id: i64,
    pub volume_id: i64,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Archive {
    pub id: i64,
    pub destinations: Vec<ArchiveDestination>,
    pub patterns: Vec<ArchivePattern>,
}
