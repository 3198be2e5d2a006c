use super::models::*;
use super::sqlite::Database;
use crate::hasher::{FileIdentity, Sha256Hash};
use crate::platform::volumes::VolumeDescriptor;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Result, Row, ToSql};
use tracing::debug;

const STORAGE_RECORD_SELECT: &str = "SELECT sr.id, sr.content_entry_id, ce.size, ce.short_hash, ce.hash, \
            l.volume_id, sr.location_id, dp.name, fname.name, sr.modified_at, sr.last_seen \
     FROM storage_record sr \
     JOIN content_entry ce ON sr.content_entry_id = ce.id \
     JOIN location l ON sr.location_id = l.id \
     JOIN directory_path dp ON l.directory_path_id = dp.id \
     JOIN file_name fname ON sr.file_name_id = fname.id";

const VOLUME_SELECT: &str = "SELECT id, device_id, label, total_space, free_space, should_scan, \
            last_scan, dirty \
     FROM volume";

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn storage_record_from_row(row: &Row<'_>) -> Result<StorageRecord> {
    Ok(StorageRecord {
        id: row.get(0)?,
        content_entry_id: row.get(1)?,
        size: row.get(2)?,
        short_hash: row.get(3)?,
        hash: row.get(4)?,
        volume_id: row.get(5)?,
        location_id: row.get(6)?,
        path: row.get(7)?,
        file_name: row.get(8)?,
        modified_at: row.get(9)?,
        last_seen: row.get(10)?,
    })
}

fn volume_from_row(row: &Row<'_>) -> Result<Volume> {
    Ok(Volume {
        id: row.get(0)?,
        device_id: row.get(1)?,
        label: row.get(2)?,
        total_space: row.get(3)?,
        free_space: row.get(4)?,
        should_scan: row.get(5)?,
        last_scan: row.get(6)?,
        dirty: row.get(7)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(err, rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation)
}

/// Select-then-insert-if-absent. A unique violation on insert means another writer got there
/// first, so the existing row is re-read instead of surfacing an error.
fn select_or_insert(
    conn: &Connection,
    select_sql: &str,
    insert_sql: &str,
    params: &[&dyn ToSql],
) -> Result<i64> {
    if let Some(id) = conn
        .query_row(select_sql, params, |row| row.get(0))
        .optional()?
    {
        return Ok(id);
    }
    match conn.execute(insert_sql, params) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => conn.query_row(select_sql, params, |row| row.get(0)),
        Err(e) => Err(e),
    }
}

// ── Transaction-scoped primitives ────────────────────────────
//
// These take any connection (a `Transaction` derefs to one) so that composite operations can
// run several of them under a single commit.

pub(crate) fn ensure_directory_path(conn: &Connection, name: &str) -> Result<i64> {
    select_or_insert(
        conn,
        "SELECT id FROM directory_path WHERE name = ?1",
        "INSERT INTO directory_path (name) VALUES (?1)",
        &[&name],
    )
}

pub(crate) fn ensure_file_name(conn: &Connection, name: &str) -> Result<i64> {
    select_or_insert(
        conn,
        "SELECT id FROM file_name WHERE name = ?1",
        "INSERT INTO file_name (name) VALUES (?1)",
        &[&name],
    )
}

pub(crate) fn ensure_location(conn: &Connection, volume_id: i64, path: &str) -> Result<i64> {
    let path_id = ensure_directory_path(conn, path)?;
    select_or_insert(
        conn,
        "SELECT id FROM location WHERE volume_id = ?1 AND directory_path_id = ?2",
        "INSERT INTO location (volume_id, directory_path_id) VALUES (?1, ?2)",
        &[&volume_id, &path_id],
    )
}

pub(crate) fn ensure_content_entry(conn: &Connection, identity: &FileIdentity) -> Result<i64> {
    let size = identity.size as i64;
    select_or_insert(
        conn,
        "SELECT id FROM content_entry WHERE size = ?1 AND short_hash = ?2 AND hash = ?3",
        "INSERT INTO content_entry (size, short_hash, hash) VALUES (?1, ?2, ?3)",
        &[&size, &identity.short_hash, &identity.hash],
    )
}

/// Point (location, file name) at a content entry, stamping mtime and last-seen.
/// Returns the storage record id.
pub(crate) fn upsert_storage_record(
    conn: &Connection,
    location_id: i64,
    file_name: &str,
    content_entry_id: i64,
    modified_at: i64,
    last_seen: i64,
) -> Result<i64> {
    let file_name_id = ensure_file_name(conn, file_name)?;
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM storage_record WHERE location_id = ?1 AND file_name_id = ?2",
            params![location_id, file_name_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE storage_record SET content_entry_id = ?1, modified_at = ?2, last_seen = ?3 \
                 WHERE id = ?4",
                params![content_entry_id, modified_at, last_seen, id],
            )?;
            Ok(id)
        }
        None => {
            conn.execute(
                "INSERT INTO storage_record \
                 (content_entry_id, location_id, file_name_id, modified_at, last_seen) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![content_entry_id, location_id, file_name_id, modified_at, last_seen],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}

pub(crate) fn storage_record_by_id(conn: &Connection, id: i64) -> Result<Option<StorageRecord>> {
    conn.query_row(
        &format!("{} WHERE sr.id = ?1", STORAGE_RECORD_SELECT),
        params![id],
        storage_record_from_row,
    )
    .optional()
}

pub(crate) fn storage_record_at(
    conn: &Connection,
    volume_id: i64,
    path: &str,
    file_name: &str,
) -> Result<Option<StorageRecord>> {
    conn.query_row(
        &format!(
            "{} WHERE l.volume_id = ?1 AND dp.name = ?2 AND fname.name = ?3",
            STORAGE_RECORD_SELECT
        ),
        params![volume_id, path, file_name],
        storage_record_from_row,
    )
    .optional()
}

impl Database {
    // ── Volumes ──────────────────────────────────────────────────

    /// Insert a volume on first sight of its device id, otherwise refresh label and capacity.
    pub fn ensure_volume(&self, descriptor: &VolumeDescriptor) -> Result<Volume> {
        let tx = self.connection().unchecked_transaction()?;
        let total = descriptor.total_space as i64;
        let free = descriptor.free_space as i64;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM volume WHERE device_id = ?1",
                params![descriptor.stable_id],
                |row| row.get(0),
            )
            .optional()?;
        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE volume SET label = ?1, total_space = ?2, free_space = ?3 WHERE id = ?4",
                    params![descriptor.label, total, free, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO volume (device_id, label, total_space, free_space, should_scan) \
                     VALUES (?1, ?2, ?3, ?4, 1)",
                    params![descriptor.stable_id, descriptor.label, total, free],
                )?;
                tx.last_insert_rowid()
            }
        };
        let volume = tx.query_row(
            &format!("{} WHERE id = ?1", VOLUME_SELECT),
            params![id],
            volume_from_row,
        )?;
        tx.commit()?;
        debug!("Volume #{} ({}) registered", volume.id, volume.device_id);
        Ok(volume)
    }

    pub fn list_volumes(&self) -> Result<Vec<Volume>> {
        let mut stmt = self
            .connection()
            .prepare(&format!("{} ORDER BY label ASC, id ASC", VOLUME_SELECT))?;
        let volumes = stmt
            .query_map([], volume_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(volumes)
    }

    pub fn get_volume(&self, volume_id: i64) -> Result<Option<Volume>> {
        self.connection()
            .query_row(
                &format!("{} WHERE id = ?1", VOLUME_SELECT),
                params![volume_id],
                volume_from_row,
            )
            .optional()
    }

    /// Returns false when no such volume exists.
    pub fn set_volume_should_scan(&self, volume_id: i64, should_scan: bool) -> Result<bool> {
        let changed = self.connection().execute(
            "UPDATE volume SET should_scan = ?1 WHERE id = ?2",
            params![should_scan, volume_id],
        )?;
        Ok(changed > 0)
    }

    pub fn mark_volume_dirty(&self, volume_id: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE volume SET dirty = 1 WHERE id = ?1",
            params![volume_id],
        )?;
        Ok(())
    }

    pub fn complete_volume_scan(&self, volume_id: i64, completed_at: i64) -> Result<()> {
        self.connection().execute(
            "UPDATE volume SET dirty = 0, last_scan = ?1 WHERE id = ?2",
            params![completed_at, volume_id],
        )?;
        Ok(())
    }

    // ── Interned strings, locations, content entries ─────────────

    pub fn ensure_directory_path(&self, name: &str) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let id = ensure_directory_path(&tx, name)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn ensure_file_name(&self, name: &str) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let id = ensure_file_name(&tx, name)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn ensure_location(&self, volume_id: i64, path: &str) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let id = ensure_location(&tx, volume_id, path)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn ensure_content_entry(&self, identity: &FileIdentity) -> Result<i64> {
        let tx = self.connection().unchecked_transaction()?;
        let id = ensure_content_entry(&tx, identity)?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_content_entry(&self, content_entry_id: i64) -> Result<Option<ContentEntry>> {
        self.connection()
            .query_row(
                "SELECT id, size, short_hash, hash FROM content_entry WHERE id = ?1",
                params![content_entry_id],
                |row| {
                    Ok(ContentEntry {
                        id: row.get(0)?,
                        size: row.get(1)?,
                        short_hash: row.get(2)?,
                        hash: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn content_entry_count(&self) -> Result<i64> {
        self.connection()
            .query_row("SELECT COUNT(*) FROM content_entry", [], |row| row.get(0))
    }

    // ── Storage records ──────────────────────────────────────────

    pub fn upsert_storage_record(
        &self,
        location_id: i64,
        file_name: &str,
        content_entry_id: i64,
        modified_at: i64,
    ) -> Result<StorageRecord> {
        let tx = self.connection().unchecked_transaction()?;
        let id = upsert_storage_record(
            &tx,
            location_id,
            file_name,
            content_entry_id,
            modified_at,
            now_unix(),
        )?;
        let record = storage_record_by_id(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(record)
    }

    /// Record a file with freshly computed identity: ensures the content entry and location and
    /// upserts the storage record, all in one transaction.
    pub fn index_file(
        &self,
        volume_id: i64,
        path: &str,
        file_name: &str,
        identity: &FileIdentity,
        modified_at: i64,
    ) -> Result<StorageRecord> {
        let tx = self.connection().unchecked_transaction()?;
        let content_entry_id = ensure_content_entry(&tx, identity)?;
        let location_id = ensure_location(&tx, volume_id, path)?;
        let id = upsert_storage_record(
            &tx,
            location_id,
            file_name,
            content_entry_id,
            modified_at,
            now_unix(),
        )?;
        let record = storage_record_by_id(&tx, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tx.commit()?;
        Ok(record)
    }

    /// Fast path for rescans: when the stored size, mtime and short hash all match, refresh
    /// last-seen and return the record. Returns `None` when the file is new or changed.
    pub fn confirm_unchanged(
        &self,
        volume_id: i64,
        path: &str,
        file_name: &str,
        size: i64,
        modified_at: i64,
        short_hash: &Sha256Hash,
    ) -> Result<Option<StorageRecord>> {
        let tx = self.connection().unchecked_transaction()?;
        let record = match storage_record_at(&tx, volume_id, path, file_name)? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.size != size || record.modified_at != modified_at || record.short_hash != *short_hash {
            return Ok(None);
        }

        let last_seen = now_unix();
        tx.execute(
            "UPDATE storage_record SET last_seen = ?1 WHERE id = ?2",
            params![last_seen, record.id],
        )?;
        tx.commit()?;
        Ok(Some(StorageRecord { last_seen, ..record }))
    }

    pub fn find_storage_record(
        &self,
        volume_id: i64,
        path: &str,
        file_name: &str,
    ) -> Result<Option<StorageRecord>> {
        storage_record_at(self.connection(), volume_id, path, file_name)
    }

    pub fn get_storage_record(&self, storage_id: i64) -> Result<Option<StorageRecord>> {
        storage_record_by_id(self.connection(), storage_id)
    }

    /// All storage records on one volume, or on every volume when `volume_id` is `None`.
    pub fn storage_records_on_volume(&self, volume_id: Option<i64>) -> Result<Vec<StorageRecord>> {
        let records = match volume_id {
            Some(volume_id) => {
                let mut stmt = self.connection().prepare(&format!(
                    "{} WHERE l.volume_id = ?1 ORDER BY sr.id",
                    STORAGE_RECORD_SELECT
                ))?;
                let rows = stmt
                    .query_map(params![volume_id], storage_record_from_row)?
                    .collect::<Result<Vec<_>>>()?;
                rows
            }
            None => {
                let mut stmt = self
                    .connection()
                    .prepare(&format!("{} ORDER BY sr.id", STORAGE_RECORD_SELECT))?;
                let rows = stmt
                    .query_map([], storage_record_from_row)?
                    .collect::<Result<Vec<_>>>()?;
                rows
            }
        };
        Ok(records)
    }

    /// Every instance of one content entry, optionally restricted to one volume.
    pub fn storage_records_for_content(
        &self,
        content_entry_id: i64,
        only_on_volume: Option<i64>,
    ) -> Result<Vec<StorageRecord>> {
        let mut stmt = self.connection().prepare_cached(&format!(
            "{} WHERE sr.content_entry_id = ?1 AND (?2 IS NULL OR l.volume_id = ?2) ORDER BY sr.id",
            STORAGE_RECORD_SELECT
        ))?;
        let records = stmt
            .query_map(params![content_entry_id, only_on_volume], storage_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Substring search over file names, ignoring case for ASCII letters only (SQLite `LIKE`).
    /// `%` and `_` in the needle are literal.
    pub fn storage_records_by_file_name(&self, needle: &str) -> Result<Vec<StorageRecord>> {
        let escaped = needle
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let like_pattern = format!("%{}%", escaped);
        let mut stmt = self.connection().prepare(&format!(
            "{} WHERE fname.name LIKE ?1 ESCAPE '\\' ORDER BY sr.id",
            STORAGE_RECORD_SELECT
        ))?;
        let records = stmt
            .query_map(params![like_pattern], storage_record_from_row)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Delete storage records in one transaction. Content entries are left in place.
    pub fn delete_storage_records(&self, storage_ids: &[i64]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM storage_record WHERE id = ?1")?;
            for id in storage_ids {
                count += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        debug!("Deleted {} storage records", count);
        Ok(count)
    }
}
