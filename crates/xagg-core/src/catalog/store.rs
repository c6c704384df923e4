//! SQLite-backed catalog of leaf directories.
//!
//! The store owns a single connection behind a mutex. Bulk writes are split
//! into transactions of [`CatalogConfig::BATCH_SIZE`] rows.

use super::types::{
    format_timestamp, parse_timestamp, ArtifactRecord, CatalogEntry, CatalogSnapshot, DirStat,
    EntryFilter, InvalidPath,
};
use crate::config::CatalogConfig;
use crate::identity::DatasetIdentity;
use crate::{Result, XaggError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Statement};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

const ENTRY_COLUMNS: &str = "path, identity_key, mip_era, activity, institute, model, experiment,
    member, mip_table, realm, frequency, variable, grid, grid_label, version,
    created, modified, accessed, artifact_path, artifact_write_time, error,
    retired, retire_time, ignored, ignore_time";

/// Persistent catalog store.
pub struct CatalogStore {
    db_path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl CatalogStore {
    /// Create or open a catalog at the given path.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| XaggError::Io {
                    message: format!("Failed to create directory {}", parent.display()),
                    path: Some(parent.to_path_buf()),
                    source: Some(e),
                })?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened catalog at {}", db_path.display());

        Ok(Self {
            db_path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout={};
            PRAGMA synchronous=NORMAL;
            PRAGMA temp_store=MEMORY;
            ",
            CatalogConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS entries (
                path TEXT PRIMARY KEY,
                identity_key TEXT NOT NULL,
                mip_era TEXT NOT NULL,
                activity TEXT NOT NULL,
                institute TEXT NOT NULL,
                model TEXT NOT NULL,
                experiment TEXT NOT NULL,
                member TEXT NOT NULL,
                mip_table TEXT NOT NULL,
                realm TEXT NOT NULL,
                frequency TEXT NOT NULL,
                variable TEXT NOT NULL,
                grid TEXT NOT NULL,
                grid_label TEXT NOT NULL,
                version TEXT NOT NULL,
                created TEXT NOT NULL,
                modified TEXT NOT NULL,
                accessed TEXT NOT NULL,
                artifact_path TEXT,
                artifact_write_time TEXT,
                error TEXT,
                retired INTEGER NOT NULL DEFAULT 0,
                retire_time TEXT,
                ignored INTEGER NOT NULL DEFAULT 0,
                ignore_time TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_entries_identity ON entries(identity_key);
            CREATE INDEX IF NOT EXISTS idx_entries_variable ON entries(variable, frequency);

            CREATE TABLE IF NOT EXISTS invalid_paths (
                path TEXT PRIMARY KEY,
                recorded TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time TEXT NOT NULL,
                total INTEGER NOT NULL,
                new INTEGER NOT NULL,
                invalid INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                missing INTEGER NOT NULL,
                returned INTEGER NOT NULL,
                deleted INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS stats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                indicator TEXT NOT NULL,
                value INTEGER NOT NULL,
                time TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Get the database path.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| XaggError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    /// Load every entry plus the invalid-path set.
    pub fn snapshot(&self) -> Result<CatalogSnapshot> {
        Ok(CatalogSnapshot {
            entries: self.entries()?,
            invalid_paths: self.invalid_paths()?,
        })
    }

    /// All entries in catalog iteration (insertion) order.
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries ORDER BY rowid"
        ))?;
        let entries = stmt
            .query_map([], row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn get(&self, path: &str) -> Result<Option<CatalogEntry>> {
        let conn = self.lock_conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE path = ?1"),
                params![path],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn invalid_paths(&self) -> Result<HashSet<String>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT path FROM invalid_paths")?;
        let paths = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(paths)
    }

    /// Run `bind` for every row, committing every `BATCH_SIZE` rows.
    fn execute_batched<T, F>(&self, sql: &str, rows: &[T], mut bind: F) -> Result<usize>
    where
        F: FnMut(&mut Statement<'_>, &T) -> rusqlite::Result<usize>,
    {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock_conn()?;
        let mut affected = 0;
        for chunk in rows.chunks(CatalogConfig::BATCH_SIZE) {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare_cached(sql)?;
                for row in chunk {
                    affected += bind(&mut *stmt, row)?;
                }
            }
            tx.commit()?;
        }
        Ok(affected)
    }

    /// Insert newly sighted entries.
    pub fn insert_entries(&self, entries: &[CatalogEntry]) -> Result<usize> {
        let sql = format!(
            "INSERT INTO entries ({ENTRY_COLUMNS}) VALUES
             (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
              ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        );
        let inserted = self.execute_batched(&sql, entries, |stmt, e| {
            let id = &e.identity;
            stmt.execute(params![
                e.path,
                id.key(),
                id.mip_era,
                id.activity,
                id.institute,
                id.model,
                id.experiment,
                id.member,
                id.table,
                id.realm,
                id.frequency,
                id.variable,
                id.grid,
                id.grid_label,
                id.version,
                format_timestamp(&e.created),
                format_timestamp(&e.modified),
                format_timestamp(&e.accessed),
                e.artifact_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                e.artifact_write_time.as_ref().map(format_timestamp),
                e.error,
                e.retired,
                e.retire_time.as_ref().map(format_timestamp),
                e.ignored,
                e.ignore_time.as_ref().map(format_timestamp),
            ])
        })?;
        debug!("Inserted {} catalog entries", inserted);
        Ok(inserted)
    }

    /// Record paths whose identity could not be resolved.
    pub fn insert_invalid_paths(&self, paths: &[InvalidPath]) -> Result<usize> {
        self.execute_batched(
            "INSERT OR IGNORE INTO invalid_paths (path, recorded) VALUES (?1, ?2)",
            paths,
            |stmt, p| stmt.execute(params![p.path, format_timestamp(&p.recorded)]),
        )
    }

    /// Refresh timestamps of modified or returning directories and return them
    /// to the unscanned, live state.
    pub fn refresh_entries(&self, refreshed: &[(String, DirStat)]) -> Result<usize> {
        self.execute_batched(
            "UPDATE entries SET created = ?2, modified = ?3, accessed = ?4,
                artifact_path = NULL, artifact_write_time = NULL, error = NULL,
                retired = 0, retire_time = NULL, ignored = 0, ignore_time = NULL
             WHERE path = ?1",
            refreshed,
            |stmt, (path, stat)| {
                stmt.execute(params![
                    path,
                    format_timestamp(&stat.created),
                    format_timestamp(&stat.modified),
                    format_timestamp(&stat.accessed),
                ])
            },
        )
    }

    /// Mark directories missing from disk as retired. Artifact fields are
    /// cleared. `ignored` and `ignore_time` are kept and only reset when the
    /// directory returns through [`CatalogStore::refresh_entries`].
    pub fn retire_entries(&self, paths: &[String], now: DateTime<Utc>) -> Result<usize> {
        let now = format_timestamp(&now);
        self.execute_batched(
            "UPDATE entries SET retired = 1, retire_time = ?2,
                artifact_path = NULL, artifact_write_time = NULL, error = NULL
             WHERE path = ?1",
            paths,
            |stmt, path| stmt.execute(params![path, now]),
        )
    }

    /// Write back artifact generation outcomes.
    pub fn record_artifacts(&self, records: &[ArtifactRecord]) -> Result<usize> {
        let written = self.execute_batched(
            "UPDATE entries SET artifact_path = ?2, artifact_write_time = ?3, error = ?4
             WHERE path = ?1",
            records,
            |stmt, r| {
                stmt.execute(params![
                    r.path,
                    r.artifact_path.as_ref().map(|p| p.to_string_lossy().into_owned()),
                    format_timestamp(&r.write_time),
                    r.error,
                ])
            },
        )?;
        info!("Recorded {} artifact results", written);
        Ok(written)
    }

    /// Flag entries as ignored because their dataset was retracted. Artifact
    /// fields are cleared; moving the files is up to the caller.
    pub fn mark_retracted(&self, paths: &[String], now: DateTime<Utc>) -> Result<usize> {
        let now = format_timestamp(&now);
        self.execute_batched(
            "UPDATE entries SET artifact_path = NULL, artifact_write_time = NULL,
                error = ?2, ignored = 1, ignore_time = ?3
             WHERE path = ?1",
            paths,
            |stmt, path| stmt.execute(params![path, CatalogConfig::RETRACTED_ERROR, now]),
        )
    }

    /// Clear the retracted flag on entries whose dataset is no longer listed.
    pub fn clear_retracted(&self, paths: &[String]) -> Result<usize> {
        self.execute_batched(
            "UPDATE entries SET error = NULL, ignored = 0, ignore_time = NULL
             WHERE path = ?1 AND error = ?2",
            paths,
            |stmt, path| stmt.execute(params![path, CatalogConfig::RETRACTED_ERROR]),
        )
    }

    /// Entries matching a maintenance filter, in catalog order.
    pub fn select(&self, filter: &EntryFilter) -> Result<Vec<CatalogEntry>> {
        let (clause, values) = filter_clause(filter);
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE {clause} ORDER BY rowid"
        ))?;
        let entries = stmt
            .query_map(params_from_iter(values.iter()), row_to_entry)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Clear artifact fields of matching entries so they are scheduled again.
    /// Returns the entries as they were before the reset.
    pub fn reset_artifacts(&self, filter: &EntryFilter) -> Result<Vec<CatalogEntry>> {
        self.mutate_matching(
            filter,
            "UPDATE entries SET artifact_path = NULL, artifact_write_time = NULL, error = NULL",
            &[],
        )
    }

    /// Clear artifact fields of matching entries and mark them ignored so
    /// they are never scheduled again. Returns the entries as they were.
    pub fn ignore_entries(
        &self,
        filter: &EntryFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogEntry>> {
        let now = format_timestamp(&now);
        self.mutate_matching(
            filter,
            "UPDATE entries SET artifact_path = NULL, artifact_write_time = NULL, error = NULL,
                ignored = 1, ignore_time = ?",
            &[now],
        )
    }

    /// Delete matching entries. Returns the deleted rows.
    pub fn purge_entries(&self, filter: &EntryFilter) -> Result<Vec<CatalogEntry>> {
        self.mutate_matching(filter, "DELETE FROM entries", &[])
    }

    /// Select then mutate matching rows inside one transaction.
    fn mutate_matching(
        &self,
        filter: &EntryFilter,
        statement: &str,
        leading: &[String],
    ) -> Result<Vec<CatalogEntry>> {
        let (clause, values) = filter_clause(filter);
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let matched = {
            let mut stmt = tx.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM entries WHERE {clause} ORDER BY rowid"
            ))?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), row_to_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        let bound: Vec<&String> = leading.iter().chain(values.iter()).collect();
        tx.execute(
            &format!("{statement} WHERE {clause}"),
            params_from_iter(bound),
        )?;
        tx.commit()?;
        Ok(matched)
    }
}

/// Translate a filter into a WHERE clause and its positional values.
fn filter_clause(filter: &EntryFilter) -> (String, Vec<String>) {
    let mut clauses = vec!["1 = 1".to_string()];
    let mut values = Vec::new();

    if let Some(prefix) = &filter.path_prefix {
        clauses.push("substr(path, 1, length(?)) = ?".to_string());
        values.push(prefix.clone());
        values.push(prefix.clone());
    }
    let columns = [
        ("mip_era", &filter.mip_era),
        ("model", &filter.model),
        ("experiment", &filter.experiment),
        ("variable", &filter.variable),
        ("frequency", &filter.frequency),
    ];
    for (column, value) in columns {
        if let Some(value) = value {
            clauses.push(format!("{column} = ?"));
            values.push(value.clone());
        }
    }
    match filter.has_error {
        Some(true) => clauses.push("error IS NOT NULL".to_string()),
        Some(false) => clauses.push("error IS NULL".to_string()),
        None => {}
    }
    match filter.has_artifact {
        Some(true) => clauses.push("artifact_path IS NOT NULL".to_string()),
        Some(false) => clauses.push("artifact_path IS NULL".to_string()),
        None => {}
    }

    (clauses.join(" AND "), values)
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        parse_timestamp(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    let identity = DatasetIdentity {
        mip_era: row.get(2)?,
        activity: row.get(3)?,
        institute: row.get(4)?,
        model: row.get(5)?,
        experiment: row.get(6)?,
        member: row.get(7)?,
        table: row.get(8)?,
        realm: row.get(9)?,
        frequency: row.get(10)?,
        variable: row.get(11)?,
        grid: row.get(12)?,
        grid_label: row.get(13)?,
        version: row.get(14)?,
    };
    Ok(CatalogEntry {
        path: row.get(0)?,
        identity,
        created: timestamp_at(row, 15)?,
        modified: timestamp_at(row, 16)?,
        accessed: timestamp_at(row, 17)?,
        artifact_path: row.get::<_, Option<String>>(18)?.map(PathBuf::from),
        artifact_write_time: optional_timestamp_at(row, 19)?,
        error: row.get(20)?,
        retired: row.get(21)?,
        retire_time: optional_timestamp_at(row, 22)?,
        ignored: row.get(23)?,
        ignore_time: optional_timestamp_at(row, 24)?,
    })
}
