use crate::error::Error;
use crate::platform::volumes::{VolumeDescriptor, VolumeSupplier};
use crate::report::Reporter;
use crate::scanner::{ReconcileStats, ScanReconciler};
use crate::storage::{Database, Volume};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// An indexed volume together with where it is mounted right now.
#[derive(Debug, Clone)]
pub struct AttachedVolume {
    pub volume: Volume,
    pub descriptor: VolumeDescriptor,
}

#[derive(Debug)]
pub enum VolumeScanOutcome {
    Scanned(ReconcileStats),
    /// The volume is flagged as not to be scanned.
    Disabled,
    /// Fatal for this volume only; other volumes were still scanned.
    Failed(String),
}

#[derive(Debug)]
pub struct VolumeScanResult {
    pub volume: Volume,
    pub duration: Duration,
    pub outcome: VolumeScanOutcome,
}

/// Register every attached volume in the index (insert on first sight, refresh otherwise).
pub fn attach_volumes(
    db: &Database,
    supplier: &dyn VolumeSupplier,
) -> Result<Vec<AttachedVolume>, Error> {
    let mut attached = Vec::new();
    for descriptor in supplier.attached_volumes()? {
        let volume = db.ensure_volume(&descriptor)?;
        attached.push(AttachedVolume { volume, descriptor });
    }
    Ok(attached)
}

/// Roots of the other attached volumes that lie inside `root`. Files below them belong to
/// those volumes.
pub fn nested_roots(attached: &[AttachedVolume], root: &Path) -> Vec<PathBuf> {
    attached
        .iter()
        .map(|a| &a.descriptor.root)
        .filter(|other| other.as_path() != root && other.starts_with(root))
        .cloned()
        .collect()
}

pub struct ScanEngine<'a> {
    db: &'a Database,
}

impl<'a> ScanEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Scan attached volumes one after another, or only `only_volume` when given.
    /// A failing volume is logged and recorded; the remaining volumes still run.
    pub fn scan(
        &self,
        supplier: &dyn VolumeSupplier,
        only_volume: Option<i64>,
        reporter: &dyn Reporter,
    ) -> Result<Vec<VolumeScanResult>, Error> {
        let attached = attach_volumes(self.db, supplier)?;
        info!("{} attached volumes", attached.len());

        let reconciler = ScanReconciler::new(self.db, reporter);
        let mut results = Vec::new();
        for AttachedVolume { volume, descriptor } in attached.iter().cloned() {
            if only_volume.is_some_and(|id| id != volume.id) {
                continue;
            }

            let nested = nested_roots(&attached, &descriptor.root);
            let start = Instant::now();
            let outcome = match reconciler.scan_volume(&volume, &descriptor.root, &nested) {
                Ok(Some(stats)) => VolumeScanOutcome::Scanned(stats),
                Ok(None) => VolumeScanOutcome::Disabled,
                Err(e) => {
                    error!("[{}] Scan aborted: {}", volume.label, e);
                    VolumeScanOutcome::Failed(e.to_string())
                }
            };
            results.push(VolumeScanResult {
                volume,
                duration: start.elapsed(),
                outcome,
            });
        }
        Ok(results)
    }
}
