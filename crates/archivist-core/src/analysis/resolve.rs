use crate::error::Error;
use crate::platform;
use crate::report::{ReportEvent, Reporter};
use crate::storage::queries::{now_unix, upsert_storage_record};
use crate::storage::{Database, StorageRecord};
use rusqlite::{params, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Selection label for the n-th alternative: `a`..`z`, then `aa`, `ab`, ...
pub fn as_letter(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    let rest = index / 26;
    if rest == 0 {
        letter.to_string()
    } else {
        format!("{}{}", as_letter(rest - 1), letter)
    }
}

/// Order siblings the way the operator sees them: by `path/file_name`.
pub fn sort_group(group: &mut [StorageRecord]) {
    group.sort_by_cached_key(|record| record.relative_path());
}

/// Distinct file names used by the siblings, sorted.
pub fn distinct_file_names(group: &[StorageRecord]) -> Vec<String> {
    let mut names: Vec<String> = group.iter().map(|r| r.file_name.clone()).collect();
    names.sort();
    names.dedup();
    names
}

/// What an operator line means for the current group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverInput {
    Skip,
    Quit,
    ShowMore,
    ShowLess,
    Keep(usize),
    SelectFileName(usize),
    Unrecognized,
}

/// Interpret one line of operator input. Numbers select the sibling to keep, letters select
/// an alternative file name; out-of-range choices are unrecognized.
pub fn parse_input(input: &str, group_len: usize, file_name_count: usize) -> ResolverInput {
    let input = input.trim_end_matches(&['\r', '\n'][..]);
    match input {
        "" => return ResolverInput::Skip,
        "Q" => return ResolverInput::Quit,
        "+" => return ResolverInput::ShowMore,
        "-" => return ResolverInput::ShowLess,
        _ => {}
    }
    if let Ok(number) = input.parse::<usize>() {
        return if number < group_len {
            ResolverInput::Keep(number)
        } else {
            ResolverInput::Unrecognized
        };
    }
    (0..file_name_count)
        .find(|&i| as_letter(i) == input)
        .map_or(ResolverInput::Unrecognized, ResolverInput::SelectFileName)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub storage_id: i64,
    pub path: PathBuf,
}

/// The filesystem mutations for one resolved group, computed without touching the disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePlan {
    pub keep: PlannedFile,
    pub delete: Vec<PlannedFile>,
    /// New file name for the kept file, if the operator picked a different one.
    pub rename_to: Option<String>,
}

impl MergePlan {
    pub fn all_files(&self) -> impl Iterator<Item = &PlannedFile> {
        std::iter::once(&self.keep).chain(self.delete.iter())
    }
}

/// Build the plan for keeping `group[keep]` on the volume mounted at `root`.
pub fn plan_merge(
    root: &Path,
    group: &[StorageRecord],
    keep: usize,
    target_file_name: Option<&str>,
) -> Result<MergePlan, Error> {
    let kept = group
        .get(keep)
        .ok_or_else(|| Error::Other(format!("no file No. {} in this group", keep)))?;

    let locate = |record: &StorageRecord| -> Result<PlannedFile, Error> {
        if !record.path.is_empty() && !record.path.starts_with('/') {
            return Err(Error::Other(format!(
                "unexpected path in database: {}",
                record.path
            )));
        }
        Ok(PlannedFile {
            storage_id: record.id,
            path: platform::file_on_volume(root, &record.path, &record.file_name),
        })
    };

    let delete = group
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != keep)
        .map(|(_, record)| locate(record))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MergePlan {
        keep: locate(kept)?,
        delete,
        rename_to: target_file_name
            .filter(|name| *name != kept.file_name)
            .map(str::to_string),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Some file of the group is missing on disk; nothing was touched.
    Inconsistent { missing: Vec<PathBuf> },
    Applied {
        deleted: Vec<PathBuf>,
        renamed_to: Option<PathBuf>,
        rename_skipped: bool,
    },
}

/// Execute a merge plan, then bring the index in line with what happened on disk.
///
/// All files are checked first: if any is missing the group is inconsistent with the index
/// and nothing is deleted or renamed. When a deletion or the rename fails, the files already
/// deleted are dropped from the index before the error is returned.
pub fn apply_merge(
    db: &Database,
    plan: &MergePlan,
    reporter: &dyn Reporter,
) -> Result<MergeOutcome, Error> {
    let missing: Vec<PathBuf> = plan
        .all_files()
        .filter(|f| !f.path.is_file())
        .map(|f| f.path.clone())
        .collect();
    if !missing.is_empty() {
        for path in &missing {
            warn!(
                "Inconsistent file state: {} does not actually exist on disk",
                path.display()
            );
        }
        reporter.report(ReportEvent::InconsistentGroup {
            missing: missing.clone(),
        });
        return Ok(MergeOutcome::Inconsistent { missing });
    }

    let mut deleted = Vec::new();
    let mut deleted_ids = Vec::new();
    for file in &plan.delete {
        info!("Deleting {}", file.path.display());
        if let Err(err) = fs::remove_file(&file.path) {
            record_merge(db, plan.keep.storage_id, &deleted_ids, None)?;
            return Err(err.into());
        }
        reporter.report(ReportEvent::FileDeleted {
            path: file.path.clone(),
        });
        deleted.push(file.path.clone());
        deleted_ids.push(file.storage_id);
    }

    let mut renamed_to = None;
    let mut rename_skipped = false;
    if let Some(new_name) = &plan.rename_to {
        let target = plan.keep.path.with_file_name(new_name);
        if target.exists() {
            info!(
                "Keeping {}; renaming to {} not possible, skipping it",
                plan.keep.path.display(),
                target.display()
            );
            reporter.report(ReportEvent::RenameSkipped {
                path: plan.keep.path.clone(),
                target,
            });
            rename_skipped = true;
        } else {
            info!(
                "Renaming {} to {}",
                plan.keep.path.display(),
                target.display()
            );
            if let Err(err) = fs::rename(&plan.keep.path, &target) {
                record_merge(db, plan.keep.storage_id, &deleted_ids, None)?;
                return Err(err.into());
            }
            reporter.report(ReportEvent::FileRenamed {
                from: plan.keep.path.clone(),
                to: target.clone(),
            });
            renamed_to = Some(target);
        }
    } else {
        debug!("Keeping {}", plan.keep.path.display());
    }

    let new_name = plan
        .rename_to
        .as_deref()
        .filter(|_| renamed_to.is_some());
    record_merge(db, plan.keep.storage_id, &deleted_ids, new_name)?;

    Ok(MergeOutcome::Applied {
        deleted,
        renamed_to,
        rename_skipped,
    })
}

/// Drop the records of deleted siblings and move the kept record to its new name.
fn record_merge(
    db: &Database,
    kept_id: i64,
    deleted_ids: &[i64],
    new_name: Option<&str>,
) -> Result<(), Error> {
    let tx = db.connection().unchecked_transaction()?;
    for id in deleted_ids {
        tx.execute("DELETE FROM storage_record WHERE id = ?1", params![id])?;
    }
    if let Some(new_name) = new_name {
        let kept: Option<(i64, i64, i64)> = tx
            .query_row(
                "SELECT location_id, content_entry_id, modified_at FROM storage_record WHERE id = ?1",
                params![kept_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        if let Some((location_id, content_entry_id, modified_at)) = kept {
            upsert_storage_record(
                &tx,
                location_id,
                new_name,
                content_entry_id,
                modified_at,
                now_unix(),
            )?;
            tx.execute("DELETE FROM storage_record WHERE id = ?1", params![kept_id])?;
        }
    }
    tx.commit()?;
    Ok(())
}
