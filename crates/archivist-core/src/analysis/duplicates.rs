use crate::platform::normalize_dir_path;
use crate::storage::{Database, StorageRecord};
use rusqlite::Result;
use std::collections::HashSet;
use tracing::debug;

/// Group candidates by content entry and keep the sibling sets accepted by `include`.
///
/// Each content entry is visited once, at its first occurrence among the candidates, so a
/// group is returned at most once no matter how many of its records are candidates.
/// `only_on_volume` restricts the sibling set, not the candidates.
pub fn collect_groups<F>(
    db: &Database,
    candidates: &[StorageRecord],
    only_on_volume: Option<i64>,
    mut include: F,
) -> Result<Vec<Vec<StorageRecord>>>
where
    F: FnMut(&[StorageRecord]) -> bool,
{
    let mut seen_entries: HashSet<i64> = HashSet::new();
    let mut groups = Vec::new();
    for candidate in candidates {
        if !seen_entries.insert(candidate.content_entry_id) {
            continue;
        }
        let siblings = db.storage_records_for_content(candidate.content_entry_id, only_on_volume)?;
        if !siblings.is_empty() && include(&siblings) {
            groups.push(siblings);
        }
    }
    debug!(
        "{} content entries examined, {} groups selected",
        seen_entries.len(),
        groups.len()
    );
    Ok(groups)
}

/// At least two instances; with `subdir`, at least one of them under that directory prefix
/// (case-insensitive).
pub fn has_duplicates(subdir: Option<&str>) -> impl Fn(&[StorageRecord]) -> bool {
    let prefix = subdir.map(|s| normalize_dir_path(s).to_lowercase());
    move |siblings: &[StorageRecord]| {
        siblings.len() >= 2
            && prefix.as_ref().map_or(true, |prefix| {
                siblings
                    .iter()
                    .any(|s| s.path.to_lowercase().starts_with(prefix.as_str()))
            })
    }
}

/// Every instance lives on the same volume: there is no copy anywhere else.
pub fn exclusive_to_one_volume(siblings: &[StorageRecord]) -> bool {
    siblings
        .first()
        .map_or(false, |first| siblings.iter().all(|s| s.volume_id == first.volume_id))
}

/// Instance count within optional inclusive bounds.
pub fn instance_count_within(
    min: Option<usize>,
    max: Option<usize>,
) -> impl Fn(&[StorageRecord]) -> bool {
    move |siblings: &[StorageRecord]| {
        min.map_or(true, |min| siblings.len() >= min) && max.map_or(true, |max| siblings.len() <= max)
    }
}

/// The query shapes offered to operators.
pub struct DuplicateQueryEngine<'a> {
    db: &'a Database,
}

impl<'a> DuplicateQueryEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Content stored more than once on the same volume.
    pub fn duplicates_on_volume(
        &self,
        volume_id: i64,
        subdir: Option<&str>,
    ) -> Result<Vec<Vec<StorageRecord>>> {
        let candidates = self.db.storage_records_on_volume(Some(volume_id))?;
        collect_groups(self.db, &candidates, Some(volume_id), has_duplicates(subdir))
    }

    /// Content on this volume with no instance on any other volume.
    pub fn exclusive_to_volume(&self, volume_id: i64) -> Result<Vec<Vec<StorageRecord>>> {
        let candidates = self.db.storage_records_on_volume(Some(volume_id))?;
        collect_groups(self.db, &candidates, None, exclusive_to_one_volume)
    }

    /// Content present on `volume_id` (all volumes when `None`), bounded by instance count.
    /// With `selected_volume_only`, instances elsewhere are neither listed nor counted.
    pub fn list_files(
        &self,
        volume_id: Option<i64>,
        selected_volume_only: bool,
        min_instances: Option<usize>,
        max_instances: Option<usize>,
    ) -> Result<Vec<Vec<StorageRecord>>> {
        let candidates = self.db.storage_records_on_volume(volume_id)?;
        let only_on_volume = if selected_volume_only { volume_id } else { None };
        collect_groups(
            self.db,
            &candidates,
            only_on_volume,
            instance_count_within(min_instances, max_instances),
        )
    }

    /// Every instance of content whose file name contains `needle` somewhere.
    pub fn search(&self, needle: &str) -> Result<Vec<Vec<StorageRecord>>> {
        let candidates = self.db.storage_records_by_file_name(needle)?;
        collect_groups(self.db, &candidates, None, |_| true)
    }
}
