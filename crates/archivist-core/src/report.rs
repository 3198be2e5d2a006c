use serde::Serialize;
use std::path::PathBuf;
use std::sync::Mutex;

/// One reconciliation, routing or resolution decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReportEvent {
    VolumeSkipped { volume: String, reason: String },
    VolumeMissing { volume_id: i64 },
    FileUnchanged { volume: String, path: String },
    FileUpdated { volume: String, path: String, size: i64 },
    FileSkipped { volume: String, path: String, reason: String },
    FileDiscarded { volume: String, path: String },
    NoArchiveMatch { path: PathBuf },
    AmbiguousArchive { path: PathBuf, archive_ids: Vec<i64> },
    ArchiveWithoutDestinations { archive_id: i64, path: PathBuf },
    FileCopied { source: PathBuf, destination: PathBuf },
    DestinationVerified { destination: PathBuf, preexisting: bool },
    DestinationMismatch { destination: PathBuf },
    DestinationFailed { destination: PathBuf, reason: String },
    DeletionInhibited { source: PathBuf, reason: String },
    SourceDeleted { source: PathBuf },
    InconsistentGroup { missing: Vec<PathBuf> },
    FileDeleted { path: PathBuf },
    FileRenamed { from: PathBuf, to: PathBuf },
    RenameSkipped { path: PathBuf, target: PathBuf },
}

/// Sink for decisions and progress. All methods default to no-ops.
///
/// The CLI renders events as text or JSON lines; tests collect them with [`RecordingReporter`].
pub trait Reporter: Send + Sync {
    fn report(&self, _event: ReportEvent) {}
    fn on_volume_start(&self, _label: &str) {}
    fn on_file_progress(&self, _files_checked: usize, _current_path: &str) {}
    fn on_volume_complete(&self, _label: &str, _files_checked: usize, _duration_secs: f64) {}
}

/// No-op reporter for silent operation.
pub struct SilentReporter;

impl Reporter for SilentReporter {}

/// Keeps every event in memory, in emission order.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_serialize_with_tag() {
        let event = ReportEvent::FileDiscarded {
            volume: "Photos".to_string(),
            path: "/2024/a.jpg".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"event":"file_discarded","volume":"Photos","path":"/2024/a.jpg"}"#
        );
    }

    #[test]
    fn test_recording_reporter_keeps_order() {
        let reporter = RecordingReporter::new();
        reporter.report(ReportEvent::VolumeMissing { volume_id: 1 });
        reporter.report(ReportEvent::VolumeMissing { volume_id: 2 });
        assert_eq!(
            reporter.events(),
            vec![
                ReportEvent::VolumeMissing { volume_id: 1 },
                ReportEvent::VolumeMissing { volume_id: 2 },
            ]
        );
    }
}
