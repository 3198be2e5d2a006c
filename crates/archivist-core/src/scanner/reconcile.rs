use crate::error::Error;
use crate::hasher::identity::{full_hash, short_hash, SHORT_HASH_THRESHOLD};
use crate::hasher::FileIdentity;
use crate::platform;
use crate::report::{ReportEvent, Reporter};
use crate::storage::{Database, StorageRecord, Volume};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub files_checked: usize,
    pub unchanged: usize,
    pub updated: usize,
    pub skipped: usize,
    pub discarded: usize,
}

/// Result of checking one file against the index.
#[derive(Debug, Clone)]
pub enum FileCheck {
    /// Size, mtime and short hash matched; only last-seen was refreshed.
    Unchanged(StorageRecord),
    /// New or changed file; full identity was computed and the record upserted.
    Updated(StorageRecord),
}

impl FileCheck {
    pub fn record(&self) -> &StorageRecord {
        match self {
            FileCheck::Unchanged(record) | FileCheck::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> StorageRecord {
        match self {
            FileCheck::Unchanged(record) | FileCheck::Updated(record) => record,
        }
    }
}

/// Mark-and-sweep synchronization of one volume's storage records with its directory tree.
pub struct ScanReconciler<'a> {
    db: &'a Database,
    reporter: &'a dyn Reporter,
}

impl<'a> ScanReconciler<'a> {
    pub fn new(db: &'a Database, reporter: &'a dyn Reporter) -> Self {
        Self { db, reporter }
    }

    /// Reconcile the volume mounted at `root`. Returns `None` when the volume is disabled.
    ///
    /// Directories listed in `nested` are roots of other volumes and are not descended into.
    /// Per-file I/O failures are reported and skipped. An unreadable root or a store failure
    /// aborts this volume and leaves its dirty flag set.
    pub fn scan_volume(
        &self,
        volume: &Volume,
        root: &Path,
        nested: &[PathBuf],
    ) -> Result<Option<ReconcileStats>, Error> {
        if !volume.should_scan {
            self.reporter.report(ReportEvent::VolumeSkipped {
                volume: volume.label.clone(),
                reason: "scanning disabled".to_string(),
            });
            return Ok(None);
        }

        let started = Instant::now();
        self.db.mark_volume_dirty(volume.id)?;
        self.reporter.on_volume_start(&volume.label);
        info!("[{}] Scanning {}", volume.label, root.display());

        fs::read_dir(root).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("volume root {} is not readable: {}", root.display(), e),
            )
        })?;

        let mut stats = ReconcileStats::default();
        let mut seen: HashSet<i64> = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !is_nested_root(nested, entry.path()));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    warn!("[{}] Cannot read {}: {}", volume.label, path, err);
                    self.reporter.report(ReportEvent::FileSkipped {
                        volume: volume.label.clone(),
                        path,
                        reason: err.to_string(),
                    });
                    stats.skipped += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            stats.files_checked += 1;
            let display_path = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .display()
                .to_string();
            self.reporter
                .on_file_progress(stats.files_checked, &display_path);

            match self.check_file(volume, root, entry.path()) {
                Ok(FileCheck::Unchanged(record)) => {
                    self.reporter.report(ReportEvent::FileUnchanged {
                        volume: volume.label.clone(),
                        path: record.relative_path(),
                    });
                    seen.insert(record.id);
                    stats.unchanged += 1;
                }
                Ok(FileCheck::Updated(record)) => {
                    self.reporter.report(ReportEvent::FileUpdated {
                        volume: volume.label.clone(),
                        path: record.relative_path(),
                        size: record.size,
                    });
                    seen.insert(record.id);
                    stats.updated += 1;
                }
                Err(Error::Io(err)) => {
                    warn!("[{}] Skipping {}: {}", volume.label, display_path, err);
                    self.reporter.report(ReportEvent::FileSkipped {
                        volume: volume.label.clone(),
                        path: display_path,
                        reason: err.to_string(),
                    });
                    stats.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        stats.discarded = self.discard_unseen(volume, &seen)?;
        self.db
            .complete_volume_scan(volume.id, chrono::Utc::now().timestamp())?;

        let duration = started.elapsed().as_secs_f64();
        self.reporter
            .on_volume_complete(&volume.label, stats.files_checked, duration);
        info!(
            "[{}] Scan complete in {:.2}s: {} unchanged, {} updated, {} skipped, {} discarded",
            volume.label, duration, stats.unchanged, stats.updated, stats.skipped, stats.discarded
        );
        Ok(Some(stats))
    }

    /// Bring the index entry for one regular file up to date.
    ///
    /// `Error::Io` means this file alone could not be processed; any other error comes from
    /// the store.
    pub fn check_file(&self, volume: &Volume, root: &Path, path: &Path) -> Result<FileCheck, Error> {
        let (dir, name) = split_volume_path(root, path)?;

        let mut file = File::open(path)?;
        let metadata = file.metadata()?;
        let size = metadata.len();
        let modified_at = platform::modified_unix(&metadata)?;
        let short = short_hash(&mut file, size)?;

        if let Some(record) = self.db.confirm_unchanged(
            volume.id,
            &dir,
            &name,
            size as i64,
            modified_at,
            &short,
        )? {
            debug!("[{}] {}/{} seems same", volume.label, dir, name);
            return Ok(FileCheck::Unchanged(record));
        }

        debug!("[{}] {}/{} is different or new", volume.label, dir, name);
        let hash = if size <= SHORT_HASH_THRESHOLD {
            short
        } else {
            full_hash(&mut file)?
        };
        let identity = FileIdentity::new(size, short, hash);
        let record = self
            .db
            .index_file(volume.id, &dir, &name, &identity, modified_at)?;
        Ok(FileCheck::Updated(record))
    }

    /// Sweep: delete every storage record of this volume that the walk did not confirm.
    fn discard_unseen(&self, volume: &Volume, seen: &HashSet<i64>) -> Result<usize, Error> {
        let known = self.db.storage_records_on_volume(Some(volume.id))?;
        let mut unseen = Vec::new();
        for record in known {
            if !seen.contains(&record.id) {
                info!(
                    "[{}] Discarding unseen file {}",
                    volume.label,
                    record.relative_path()
                );
                self.reporter.report(ReportEvent::FileDiscarded {
                    volume: volume.label.clone(),
                    path: record.relative_path(),
                });
                unseen.push(record.id);
            }
        }
        Ok(self.db.delete_storage_records(&unseen)?)
    }
}

pub(crate) fn is_nested_root(nested: &[PathBuf], path: &Path) -> bool {
    let hit = nested.iter().any(|root| root.as_path() == path);
    if hit {
        debug!("Not descending into {}, another volume is mounted there", path.display());
    }
    hit
}

/// Split an absolute file path into its index directory and file name.
pub fn split_volume_path(root: &Path, path: &Path) -> io::Result<(String, String)> {
    let invalid = |what: &str| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} {} under {}", what, path.display(), root.display()),
        )
    };
    let parent = path.parent().ok_or_else(|| invalid("no parent directory for"))?;
    let dir = platform::relative_dir_path(root, parent)
        .ok_or_else(|| invalid("cannot index directory of"))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| invalid("unsupported file name"))?;
    Ok((dir, name.to_string()))
}
