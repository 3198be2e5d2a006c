use crate::engine::{attach_volumes, nested_roots, AttachedVolume};
use crate::error::Error;
use crate::hasher::FileIdentity;
use crate::platform::{self, volumes::volume_containing, volumes::VolumeSupplier};
use crate::report::{ReportEvent, Reporter};
use crate::scanner::reconcile::is_nested_root;
use crate::scanner::ScanReconciler;
use crate::storage::queries::{ensure_content_entry, now_unix, upsert_storage_record};
use crate::storage::{Archive, Database, StorageRecord};
use filetime::FileTime;
use rusqlite::params;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Which archive, if any, claims a file.
#[derive(Debug)]
pub enum ArchiveSelection<'a> {
    NoMatch,
    One(&'a Archive),
    /// More than one archive matches; never resolved automatically.
    Ambiguous(Vec<i64>),
}

/// An archive claims a file when any of its patterns accepts the name and timestamp.
pub fn select_archive<'a>(
    archives: &'a [Archive],
    file_name: &str,
    timestamp: i64,
) -> ArchiveSelection<'a> {
    let matching: Vec<&Archive> = archives
        .iter()
        .filter(|archive| {
            archive
                .patterns
                .iter()
                .any(|pattern| pattern.accepts(file_name, timestamp))
        })
        .collect();
    match matching.as_slice() {
        [] => ArchiveSelection::NoMatch,
        [archive] => ArchiveSelection::One(*archive),
        _ => ArchiveSelection::Ambiguous(matching.iter().map(|a| a.id).collect()),
    }
}

/// One destination of a routing run. `path` is `None` when the destination volume is not
/// attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTarget {
    pub location_id: i64,
    pub volume_id: i64,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationStatus {
    /// Copied by this run and verified identical.
    Copied,
    /// Already there before this run and identical. Success, but the source must stay.
    AlreadyPresent,
    Mismatch,
    Failed(String),
    VolumeNotAttached,
}

impl DestinationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DestinationStatus::Copied | DestinationStatus::AlreadyPresent)
    }

    pub fn allows_deletion(&self) -> bool {
        matches!(self, DestinationStatus::Copied)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationOutcome {
    pub target: RouteTarget,
    pub status: DestinationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingOutcome {
    pub destinations: Vec<DestinationOutcome>,
    pub source_deleted: bool,
}

impl RoutingOutcome {
    pub fn successes(&self) -> usize {
        self.destinations
            .iter()
            .filter(|d| d.status.is_success())
            .count()
    }

    pub fn failures(&self) -> usize {
        self.destinations.len() - self.successes()
    }
}

/// Copy `source` to every target, verify each copy on its own, and delete the source only
/// if every target verified and none of them held the file beforehand.
pub fn route_file(
    source: &Path,
    source_identity: &FileIdentity,
    targets: &[RouteTarget],
    reporter: &dyn Reporter,
) -> RoutingOutcome {
    let mut destinations = Vec::with_capacity(targets.len());
    for target in targets {
        let status = match &target.path {
            Some(destination) => {
                let status = copy_and_verify(source, source_identity, destination, reporter)
                    .unwrap_or_else(|err| DestinationStatus::Failed(err.to_string()));
                report_destination(destination, &status, reporter);
                status
            }
            None => {
                warn!(
                    "Destination location #{} is on volume #{}, which is not attached",
                    target.location_id, target.volume_id
                );
                reporter.report(ReportEvent::VolumeMissing {
                    volume_id: target.volume_id,
                });
                DestinationStatus::VolumeNotAttached
            }
        };
        destinations.push(DestinationOutcome {
            target: target.clone(),
            status,
        });
    }

    let mut outcome = RoutingOutcome {
        destinations,
        source_deleted: false,
    };
    if let Some(reason) = deletion_blocker(&outcome) {
        info!("Keeping {}: {}", source.display(), reason);
        reporter.report(ReportEvent::DeletionInhibited {
            source: source.to_path_buf(),
            reason,
        });
        return outcome;
    }

    match fs::remove_file(source) {
        Ok(()) => {
            info!("Deleted {}", source.display());
            reporter.report(ReportEvent::SourceDeleted {
                source: source.to_path_buf(),
            });
            outcome.source_deleted = true;
        }
        Err(err) => {
            warn!("Cannot delete {}: {}", source.display(), err);
            reporter.report(ReportEvent::DeletionInhibited {
                source: source.to_path_buf(),
                reason: err.to_string(),
            });
        }
    }
    outcome
}

fn deletion_blocker(outcome: &RoutingOutcome) -> Option<String> {
    if outcome.destinations.is_empty() {
        return Some("no destinations".to_string());
    }
    let failures = outcome.failures();
    if failures > 0 {
        return Some(format!(
            "{} of {} destinations failed",
            failures,
            outcome.destinations.len()
        ));
    }
    let preexisting = outcome
        .destinations
        .iter()
        .filter(|d| !d.status.allows_deletion())
        .count();
    if preexisting > 0 {
        return Some(format!(
            "{} destinations already held this file before this run",
            preexisting
        ));
    }
    None
}

fn copy_and_verify(
    source: &Path,
    source_identity: &FileIdentity,
    destination: &Path,
    reporter: &dyn Reporter,
) -> io::Result<DestinationStatus> {
    let preexisting = destination.exists();
    if !preexisting {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("Copying {} to {}", source.display(), destination.display());
        fs::copy(source, destination)?;
        let mtime = FileTime::from_last_modification_time(&fs::metadata(source)?);
        filetime::set_file_mtime(destination, mtime)?;
        reporter.report(ReportEvent::FileCopied {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    let found = FileIdentity::of_path(destination)?;
    Ok(if found != *source_identity {
        DestinationStatus::Mismatch
    } else if preexisting {
        DestinationStatus::AlreadyPresent
    } else {
        DestinationStatus::Copied
    })
}

fn report_destination(destination: &Path, status: &DestinationStatus, reporter: &dyn Reporter) {
    let destination = destination.to_path_buf();
    let event = match status {
        DestinationStatus::Copied => ReportEvent::DestinationVerified {
            destination,
            preexisting: false,
        },
        DestinationStatus::AlreadyPresent => ReportEvent::DestinationVerified {
            destination,
            preexisting: true,
        },
        DestinationStatus::Mismatch => {
            warn!("Content mismatch at {}", destination.display());
            ReportEvent::DestinationMismatch { destination }
        }
        DestinationStatus::Failed(reason) => {
            warn!("Copy to {} failed: {}", destination.display(), reason);
            ReportEvent::DestinationFailed {
                destination,
                reason: reason.clone(),
            }
        }
        DestinationStatus::VolumeNotAttached => ReportEvent::DestinationFailed {
            destination,
            reason: "volume not attached".to_string(),
        },
    };
    reporter.report(event);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingStats {
    pub files: usize,
    pub archived: usize,
    pub kept: usize,
    pub unmatched: usize,
    pub ambiguous: usize,
    pub skipped: usize,
}

/// Routes the files of a directory tree (or a single file) into their archives.
pub struct ArchiveRouter<'a> {
    db: &'a Database,
    reporter: &'a dyn Reporter,
}

impl<'a> ArchiveRouter<'a> {
    pub fn new(db: &'a Database, reporter: &'a dyn Reporter) -> Self {
        Self { db, reporter }
    }

    pub fn route_path(
        &self,
        supplier: &dyn VolumeSupplier,
        path: &Path,
    ) -> Result<RoutingStats, Error> {
        let attached = attach_volumes(self.db, supplier)?;
        let descriptors: Vec<_> = attached.iter().map(|a| a.descriptor.clone()).collect();
        let descriptor = volume_containing(&descriptors, path)
            .ok_or_else(|| Error::VolumeNotAttached(path.display().to_string()))?;
        let source_volume = attached
            .iter()
            .find(|a| a.descriptor.stable_id == descriptor.stable_id)
            .ok_or_else(|| Error::VolumeNotAttached(path.display().to_string()))?;
        let archives = self.db.load_archives()?;
        info!(
            "Archiving {} on [{}] with {} archives",
            path.display(),
            source_volume.volume.label,
            archives.len()
        );

        // collected up front: routing deletes files from the tree being walked
        let nested = nested_roots(&attached, &source_volume.descriptor.root);
        let files: Vec<PathBuf> = if path.is_dir() {
            WalkDir::new(path)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|entry| !is_nested_root(&nested, entry.path()))
                .filter_map(|entry| match entry {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        warn!("Cannot read {}: {}", path.display(), err);
                        None
                    }
                })
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .collect()
        } else {
            vec![path.to_path_buf()]
        };

        let mut stats = RoutingStats::default();
        for file in files {
            stats.files += 1;
            match self.route_one(source_volume, &attached, &archives, &file) {
                Ok(Routed::Archived) => stats.archived += 1,
                Ok(Routed::Kept) => stats.kept += 1,
                Ok(Routed::Unmatched) => stats.unmatched += 1,
                Ok(Routed::Ambiguous) => stats.ambiguous += 1,
                Err(Error::Io(err)) => {
                    warn!("Skipping {}: {}", file.display(), err);
                    self.reporter.report(ReportEvent::FileSkipped {
                        volume: source_volume.volume.label.clone(),
                        path: file.display().to_string(),
                        reason: err.to_string(),
                    });
                    stats.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }
        info!(
            "Archiving done: {} files, {} archived, {} kept, {} unmatched, {} ambiguous, {} skipped",
            stats.files, stats.archived, stats.kept, stats.unmatched, stats.ambiguous, stats.skipped
        );
        Ok(stats)
    }

    fn route_one(
        &self,
        source_volume: &AttachedVolume,
        attached: &[AttachedVolume],
        archives: &[Archive],
        file: &Path,
    ) -> Result<Routed, Error> {
        let reconciler = ScanReconciler::new(self.db, self.reporter);
        let record = reconciler
            .check_file(&source_volume.volume, &source_volume.descriptor.root, file)?
            .into_record();

        let archive = match select_archive(archives, &record.file_name, record.modified_at) {
            ArchiveSelection::NoMatch => {
                debug!("No archive for {}", file.display());
                self.reporter.report(ReportEvent::NoArchiveMatch {
                    path: file.to_path_buf(),
                });
                return Ok(Routed::Unmatched);
            }
            ArchiveSelection::Ambiguous(archive_ids) => {
                warn!(
                    "{} matches archives {:?}; fix the patterns",
                    file.display(),
                    archive_ids
                );
                self.reporter.report(ReportEvent::AmbiguousArchive {
                    path: file.to_path_buf(),
                    archive_ids,
                });
                return Ok(Routed::Ambiguous);
            }
            ArchiveSelection::One(archive) => archive,
        };

        if archive.destinations.is_empty() {
            warn!("Archive #{} has no destinations", archive.id);
            self.reporter.report(ReportEvent::ArchiveWithoutDestinations {
                archive_id: archive.id,
                path: file.to_path_buf(),
            });
            return Ok(Routed::Kept);
        }

        let targets: Vec<RouteTarget> = archive
            .destinations
            .iter()
            .map(|destination| RouteTarget {
                location_id: destination.location_id,
                volume_id: destination.volume_id,
                path: attached
                    .iter()
                    .find(|a| a.volume.id == destination.volume_id)
                    .map(|a| {
                        platform::file_on_volume(
                            &a.descriptor.root,
                            &destination.path,
                            &record.file_name,
                        )
                    }),
            })
            .collect();

        // the source is re-read in full; the index may only have confirmed its short hash
        let identity = FileIdentity::of_path(file)?;
        let outcome = route_file(file, &identity, &targets, self.reporter);
        self.record_routing(&record, &identity, &outcome)?;

        Ok(if outcome.source_deleted {
            Routed::Archived
        } else {
            Routed::Kept
        })
    }

    /// Verified destinations become storage records; a deleted source loses its record.
    fn record_routing(
        &self,
        source: &StorageRecord,
        identity: &FileIdentity,
        outcome: &RoutingOutcome,
    ) -> Result<(), Error> {
        let tx = self.db.connection().unchecked_transaction()?;
        let content_entry_id = ensure_content_entry(&tx, identity)?;
        let now = now_unix();
        for destination in outcome.destinations.iter().filter(|d| d.status.is_success()) {
            let modified_at = match destination_mtime(source, destination) {
                Ok(modified_at) => modified_at,
                Err(err) => {
                    warn!(
                        "Not indexing destination location #{}: {}",
                        destination.target.location_id, err
                    );
                    continue;
                }
            };
            upsert_storage_record(
                &tx,
                destination.target.location_id,
                &source.file_name,
                content_entry_id,
                modified_at,
                now,
            )?;
        }
        if outcome.source_deleted {
            tx.execute("DELETE FROM storage_record WHERE id = ?1", params![source.id])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// A fresh copy carries the source's mtime. A copy that was already there keeps its own.
fn destination_mtime(source: &StorageRecord, destination: &DestinationOutcome) -> io::Result<i64> {
    match (&destination.status, &destination.target.path) {
        (DestinationStatus::AlreadyPresent, Some(path)) => {
            platform::modified_unix(&fs::metadata(path)?)
        }
        _ => Ok(source.modified_at),
    }
}

enum Routed {
    Archived,
    Kept,
    Unmatched,
    Ambiguous,
}

/// Register `path` as a destination of an archive. The path must lie below the root of an
/// attached volume; the root itself is refused.
pub fn add_destination_path(
    db: &Database,
    supplier: &dyn VolumeSupplier,
    archive_id: i64,
    path: &Path,
) -> Result<i64, Error> {
    let attached = attach_volumes(db, supplier)?;
    let descriptors: Vec<_> = attached.iter().map(|a| a.descriptor.clone()).collect();
    let descriptor = volume_containing(&descriptors, path)
        .ok_or_else(|| Error::VolumeNotAttached(path.display().to_string()))?;
    let volume = attached
        .iter()
        .find(|a| a.descriptor.stable_id == descriptor.stable_id)
        .map(|a| &a.volume)
        .ok_or_else(|| Error::VolumeNotAttached(path.display().to_string()))?;

    let relative = platform::relative_dir_path(&descriptor.root, path)
        .ok_or_else(|| Error::Other(format!("unsupported path {}", path.display())))?;
    if relative.is_empty() {
        return Err(Error::Other(format!(
            "{} is the root of volume {}; pick a directory below it",
            path.display(),
            volume.label
        )));
    }
    db.add_archive_destination(archive_id, volume.id, &relative)
}
