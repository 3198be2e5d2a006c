use super::models::{Archive, ArchiveDestination};
use super::queries::ensure_location;
use super::sqlite::Database;
use crate::archive::ArchivePattern;
use crate::error::Error;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

impl Database {
    pub fn create_archive(&self) -> Result<i64, Error> {
        let now = chrono::Utc::now().to_rfc3339();
        self.connection()
            .execute("INSERT INTO archive (created_at) VALUES (?1)", params![now])?;
        let id = self.connection().last_insert_rowid();
        info!("Created archive #{}", id);
        Ok(id)
    }

    fn require_archive(&self, archive_id: i64) -> Result<(), Error> {
        let exists: Option<i64> = self
            .connection()
            .query_row(
                "SELECT id FROM archive WHERE id = ?1",
                params![archive_id],
                |row| row.get(0),
            )
            .optional()?;
        exists.map(|_| ()).ok_or(Error::UnknownArchive(archive_id))
    }

    /// Add a destination directory (volume-relative, normalized) to an archive.
    /// Adding the same destination twice is a no-op. Returns the location id.
    pub fn add_archive_destination(
        &self,
        archive_id: i64,
        volume_id: i64,
        path: &str,
    ) -> Result<i64, Error> {
        self.require_archive(archive_id)?;
        let tx = self.connection().unchecked_transaction()?;
        let location_id = ensure_location(&tx, volume_id, path)?;
        tx.execute(
            "INSERT OR IGNORE INTO archive_destination (archive_id, location_id) VALUES (?1, ?2)",
            params![archive_id, location_id],
        )?;
        tx.commit()?;
        debug!(
            "Archive #{}: destination volume #{} '{}'",
            archive_id, volume_id, path
        );
        Ok(location_id)
    }

    /// Add a filename/time-window rule. The pattern is validated before anything is written,
    /// so a malformed rule never reaches the index.
    pub fn add_archive_pattern(
        &self,
        archive_id: i64,
        pattern: &str,
        begin: i64,
        end: i64,
    ) -> Result<ArchivePattern, Error> {
        let validated = ArchivePattern::new(0, pattern, begin, end)?;
        self.require_archive(archive_id)?;
        self.connection().execute(
            "INSERT INTO archive_pattern (archive_id, pattern, timestamp_begin, timestamp_end) \
             VALUES (?1, ?2, ?3, ?4)",
            params![archive_id, pattern, begin, end],
        )?;
        let id = self.connection().last_insert_rowid();
        debug!("Archive #{}: pattern #{} '{}'", archive_id, id, pattern);
        Ok(ArchivePattern { id, ..validated })
    }

    /// Load every archive with its destinations and patterns, each in insertion order.
    pub fn load_archives(&self) -> Result<Vec<Archive>, Error> {
        let tx = self.connection().unchecked_transaction()?;
        let archive_ids: Vec<i64> = {
            let mut stmt = tx.prepare("SELECT id FROM archive ORDER BY id ASC")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            ids
        };

        let mut archives = Vec::with_capacity(archive_ids.len());
        {
            let mut destination_stmt = tx.prepare(
                "SELECT ad.location_id, l.volume_id, dp.name \
                 FROM archive_destination ad \
                 JOIN location l ON ad.location_id = l.id \
                 JOIN directory_path dp ON l.directory_path_id = dp.id \
                 WHERE ad.archive_id = ?1 ORDER BY ad.id",
            )?;
            let mut pattern_stmt = tx.prepare(
                "SELECT id, pattern, timestamp_begin, timestamp_end \
                 FROM archive_pattern WHERE archive_id = ?1 ORDER BY id",
            )?;

            for archive_id in archive_ids {
                let destinations = destination_stmt
                    .query_map(params![archive_id], |row| {
                        Ok(ArchiveDestination {
                            location_id: row.get(0)?,
                            volume_id: row.get(1)?,
                            path: row.get(2)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;

                let rows = pattern_stmt
                    .query_map(params![archive_id], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                let patterns = rows
                    .into_iter()
                    .map(|(id, text, begin, end)| ArchivePattern::new(id, &text, begin, end))
                    .collect::<Result<Vec<_>, _>>()?;

                archives.push(Archive {
                    id: archive_id,
                    destinations,
                    patterns,
                });
            }
        }
        tx.commit()?;
        Ok(archives)
    }
}
