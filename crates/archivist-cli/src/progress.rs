use archivist_core::{ReportEvent, Reporter};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::time::Duration;

/// Renders report events as colored text or JSON lines, with a spinner while a volume is
/// being scanned.
pub struct CliReporter {
    json: bool,
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new(json: bool) -> Self {
        Self {
            json,
            bar: Mutex::new(None),
        }
    }

    /// JSON lines go to stdout so they can be piped; text goes next to the spinner on stderr.
    fn println(&self, line: String) {
        let print = || {
            if self.json {
                println!("{}", line)
            } else {
                eprintln!("{}", line)
            }
        };
        let guard = self.bar.lock().ok();
        match guard.as_deref().and_then(Option::as_ref) {
            Some(pb) => pb.suspend(print),
            None => print(),
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }

    fn render(event: &ReportEvent) -> Option<String> {
        let line = match event {
            ReportEvent::VolumeSkipped { volume, reason } => {
                format!("  {} [{}] skipped: {}", "-".yellow(), volume, reason)
            }
            ReportEvent::VolumeMissing { volume_id } => {
                format!("  {} volume #{} is not attached", "!".red(), volume_id)
            }
            // too noisy for the terminal; logged at debug level
            ReportEvent::FileUnchanged { .. } => return None,
            ReportEvent::FileUpdated { volume, path, size } => {
                format!("  {} [{}] {} ({} bytes)", "+".green(), volume, path, size)
            }
            ReportEvent::FileSkipped {
                volume,
                path,
                reason,
            } => format!("  {} [{}] {}: {}", "!".yellow(), volume, path, reason),
            ReportEvent::FileDiscarded { volume, path } => {
                format!("  {} [{}] {} is gone", "-".red(), volume, path)
            }
            ReportEvent::NoArchiveMatch { path } => {
                format!("  {} no archive for {}", "-".dimmed(), path.display())
            }
            ReportEvent::AmbiguousArchive { path, archive_ids } => format!(
                "  {} {} matches archives {:?}",
                "!".red(),
                path.display(),
                archive_ids
            ),
            ReportEvent::ArchiveWithoutDestinations { archive_id, path } => format!(
                "  {} archive #{} has no destinations, {} stays",
                "!".red(),
                archive_id,
                path.display()
            ),
            ReportEvent::FileCopied {
                source,
                destination,
            } => format!(
                "  {} {} -> {}",
                "copy".cyan(),
                source.display(),
                destination.display()
            ),
            ReportEvent::DestinationVerified {
                destination,
                preexisting,
            } => format!(
                "  {} {}{}",
                "✓".green(),
                destination.display(),
                if *preexisting { " (already present)" } else { "" }
            ),
            ReportEvent::DestinationMismatch { destination } => format!(
                "  {} {} differs from the source",
                "✗".red(),
                destination.display()
            ),
            ReportEvent::DestinationFailed {
                destination,
                reason,
            } => format!("  {} {}: {}", "✗".red(), destination.display(), reason),
            ReportEvent::DeletionInhibited { source, reason } => format!(
                "  {} keeping {}: {}",
                "=".yellow(),
                source.display(),
                reason
            ),
            ReportEvent::SourceDeleted { source } => {
                format!("  {} deleted {}", "-".green(), source.display())
            }
            ReportEvent::InconsistentGroup { missing } => format!(
                "  {} group skipped, missing on disk: {}",
                "!".red(),
                missing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ReportEvent::FileDeleted { path } => {
                format!("  {} deleted {}", "-".red(), path.display())
            }
            ReportEvent::FileRenamed { from, to } => format!(
                "  {} renamed {} to {}",
                "~".cyan(),
                from.display(),
                to.display()
            ),
            ReportEvent::RenameSkipped { path, target } => format!(
                "  {} kept {}; {} already exists",
                "=".yellow(),
                path.display(),
                target.display()
            ),
        };
        Some(line)
    }
}

impl Reporter for CliReporter {
    fn report(&self, event: ReportEvent) {
        if self.json {
            if let Ok(line) = serde_json::to_string(&event) {
                self.println(line);
            }
        } else if let Some(line) = Self::render(&event) {
            self.println(line);
        }
    }

    fn on_volume_start(&self, label: &str) {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            pb.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
        }
        pb.set_message(format!("Scanning {}...", label));
        pb.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn on_file_progress(&self, files_checked: usize, current_path: &str) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(pb) = guard.as_ref() {
                pb.set_message(format!("{} files checked, at {}", files_checked, current_path));
            }
        }
    }

    fn on_volume_complete(&self, label: &str, files_checked: usize, duration_secs: f64) {
        self.finish_bar();
        if !self.json {
            eprintln!(
                "  {} [{}] {} files checked in {:.2}s",
                "✓".green(),
                label,
                files_checked,
                duration_secs
            );
        }
    }
}
