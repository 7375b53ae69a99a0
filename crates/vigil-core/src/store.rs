//! Durable daemon registry backed by `SQLite`.
//!
//! A single on-disk file holds the daemon table. Every mutating call is
//! executed synchronously against the file, so a record is durable by the
//! time the call returns. Concurrent access goes through one shared
//! connection; `update` holds the connection for the whole
//! read-modify-write, which serializes concurrent updates on the same key.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, params};

use crate::daemon::{DaemonRecord, DaemonStatus};

/// How long to wait on a locked database file before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors from the durable daemon registry.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No row exists for the requested key.
    #[error("daemon not found")]
    NotFound,

    /// An insert collided with an existing key.
    #[error("key already exists")]
    KeyConflict,

    /// The connection lock was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    Poisoned,

    /// Any other `SQLite` failure.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// `SQLite`-backed mapping from daemon key to [`DaemonRecord`].
///
/// Cheap to clone; clones share the underlying connection.
#[derive(Debug, Clone)]
pub struct DaemonStore {
    conn: Arc<Mutex<Connection>>,
}

impl DaemonStore {
    /// Opens the store at `path`, creating the file and schema on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] when the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory store. Intended for tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] when the connection cannot be
    /// created.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS daemon (
                key TEXT PRIMARY KEY,
                cmd TEXT NOT NULL,
                dir TEXT NOT NULL,
                status TEXT NOT NULL,
                disabled INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// All records, ordered by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on query failure.
    pub fn list(&self) -> Result<Vec<DaemonRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, cmd, dir, status, disabled FROM daemon ORDER BY key")?;
        let rows = stmt.query_map([], row_to_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// A single record by key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    pub fn get(&self, key: &str) -> Result<DaemonRecord, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT key, cmd, dir, status, disabled FROM daemon WHERE key = ?1",
            params![key],
            row_to_record,
        )
        .optional()?
        .ok_or(StoreError::NotFound)
    }

    /// Inserts a new record. Insert-only: an existing key is a conflict,
    /// never an overwrite.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyConflict`] when the key already exists.
    pub fn insert(&self, record: &DaemonRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO daemon (key, cmd, dir, status, disabled) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.key,
                record.cmd,
                record.dir,
                record.status.as_str(),
                record.disabled,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::KeyConflict)
            },
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically reads the record for `key`, applies `f`, and writes the
    /// result back. The returned record is the post-update state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no record exists.
    pub fn update<F>(&self, key: &str, f: F) -> Result<DaemonRecord, StoreError>
    where
        F: FnOnce(&mut DaemonRecord),
    {
        let conn = self.lock()?;
        let mut record = conn
            .query_row(
                "SELECT key, cmd, dir, status, disabled FROM daemon WHERE key = ?1",
                params![key],
                row_to_record,
            )
            .optional()?
            .ok_or(StoreError::NotFound)?;
        f(&mut record);
        conn.execute(
            "UPDATE daemon SET cmd = ?2, dir = ?3, status = ?4, disabled = ?5 WHERE key = ?1",
            params![
                key,
                record.cmd,
                record.dir,
                record.status.as_str(),
                record.disabled,
            ],
        )?;
        Ok(record)
    }

    /// Removes the record for `key`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on execution failure.
    pub fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM daemon WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<DaemonRecord> {
    let status: String = row.get(3)?;
    let status = status.parse::<DaemonStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(DaemonRecord {
        key: row.get(0)?,
        cmd: row.get(1)?,
        dir: row.get(2)?,
        status,
        disabled: row.get(4)?,
    })
}
