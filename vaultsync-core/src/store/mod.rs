//! Local vault store: the client-side SQLite copy of every secret.
//!
//! Rows carry a sync status and a `last_modified` write marker. Every write
//! advances the marker to `MAX(now_micros, previous + 1)` and every mutation
//! of an existing row is a single conditional statement, so callers sharing
//! one store never overwrite each other silently.

pub mod metadata;
pub mod models;

pub use metadata::SyncMetadata;
pub use models::{DeleteOutcome, SecretMeta, SecretRecord, SecretStatus};

use crate::secret::SecretHeader;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Errors from the local vault store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record not found: {0}")]
    NotFound(i64),

    /// The row changed since the caller read it.
    #[error("Record {0} was modified concurrently")]
    StaleWrite(i64),

    #[error("Record {0} is deleted")]
    ItemIsDeleted(i64),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Corrupt store: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_stale_write(&self) -> bool {
        matches!(self, Self::StaleWrite(_))
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

const SECRET_COLUMNS: &str = "local_id, secret_id, version, status, type_id, title, description, \
                              ciphertext, last_modified";

/// Thread-safe handle to the vault database.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
    /// Held for the duration of a sync pass; shared by every clone.
    sync_lock: Arc<tokio::sync::Mutex<()>>,
}

impl LocalStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            sync_lock: Arc::new(tokio::sync::Mutex::new(())),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS secrets (
                local_id INTEGER PRIMARY KEY AUTOINCREMENT,
                secret_id TEXT UNIQUE,
                version INTEGER NOT NULL DEFAULT 1,
                status INTEGER NOT NULL,
                type_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                ciphertext TEXT NOT NULL,
                last_modified INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sync_metadata (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                device_id TEXT NOT NULL,
                login TEXT,
                server_url TEXT,
                token TEXT,
                key_check TEXT,
                last_sync_at INTEGER,
                sync_lease_owner TEXT,
                sync_lease_until INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_secrets_status ON secrets(status);",
        )?;

        conn.execute(
            "INSERT OR IGNORE INTO sync_metadata (id, device_id) VALUES (1, ?1)",
            params![Uuid::new_v4().to_string()],
        )?;
        Ok(())
    }

    pub fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    pub(crate) fn sync_lock(&self) -> &tokio::sync::Mutex<()> {
        &self.sync_lock
    }

    // --- User-facing operations ---

    /// Insert a fresh record: status NEW, no secret id, version 1.
    pub fn add(&self, header: &SecretHeader, ciphertext: &str) -> StoreResult<i64> {
        let conn = self.conn()?;
        let local_id = conn.query_row(
            "INSERT INTO secrets (secret_id, version, status, type_id, title, description,
                                  ciphertext, last_modified)
             VALUES (NULL, 1, ?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING local_id",
            params![
                SecretStatus::New.as_i64(),
                header.type_id,
                header.title,
                header.description,
                ciphertext,
                now_micros(),
            ],
            |row| row.get(0),
        )?;
        Ok(local_id)
    }

    /// Overwrite a record's content if it still carries `expected_last_modified`.
    ///
    /// A NEW record stays NEW; anything else becomes EDITED. Returns the
    /// new write marker.
    pub fn update(
        &self,
        local_id: i64,
        expected_last_modified: i64,
        header: &SecretHeader,
        ciphertext: &str,
    ) -> StoreResult<i64> {
        let conn = self.conn()?;
        let updated = conn
            .query_row(
                "UPDATE secrets SET
                    type_id = ?3,
                    title = ?4,
                    description = ?5,
                    ciphertext = ?6,
                    status = CASE WHEN secret_id IS NULL THEN ?7 ELSE ?8 END,
                    last_modified = MAX(?9, last_modified + 1)
                 WHERE local_id = ?1 AND last_modified = ?2 AND status != ?10
                 RETURNING last_modified",
                params![
                    local_id,
                    expected_last_modified,
                    header.type_id,
                    header.title,
                    header.description,
                    ciphertext,
                    SecretStatus::New.as_i64(),
                    SecretStatus::Edited.as_i64(),
                    now_micros(),
                    SecretStatus::Deleted.as_i64(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        match updated {
            Some(last_modified) => Ok(last_modified),
            None => Err(explain_miss(&conn, local_id)?),
        }
    }

    pub fn get(&self, local_id: i64) -> StoreResult<SecretRecord> {
        let conn = self.conn()?;
        conn.query_row(
            &format!("SELECT {} FROM secrets WHERE local_id = ?1", SECRET_COLUMNS),
            params![local_id],
            read_record,
        )
        .optional()?
        .ok_or(StoreError::NotFound(local_id))
    }

    pub fn get_by_secret_id(&self, secret_id: &Uuid) -> StoreResult<Option<SecretRecord>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM secrets WHERE secret_id = ?1", SECRET_COLUMNS),
                params![secret_id.to_string()],
                read_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Every record without its envelope, in `local_id` order.
    pub fn list_meta(&self) -> StoreResult<Vec<SecretMeta>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT local_id, secret_id, version, status, type_id, title, description, last_modified
             FROM secrets ORDER BY local_id",
        )?;

        let metas = stmt
            .query_map([], |row| {
                Ok(SecretMeta {
                    local_id: row.get(0)?,
                    secret_id: secret_id_column(row, 1)?,
                    version: row.get(2)?,
                    status: row.get(3)?,
                    type_id: row.get(4)?,
                    title: row.get(5)?,
                    description: row.get(6)?,
                    last_modified: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(metas)
    }

    /// Delete a record on behalf of the user.
    ///
    /// A record the server has never seen is removed outright; otherwise it
    /// is marked DELETED so the next sync can push the delete.
    pub fn soft_delete(&self, local_id: i64) -> StoreResult<DeleteOutcome> {
        let conn = self.conn()?;

        let removed = conn.execute(
            "DELETE FROM secrets WHERE local_id = ?1 AND secret_id IS NULL",
            params![local_id],
        )?;
        if removed > 0 {
            return Ok(DeleteOutcome::Removed);
        }

        let marked = conn.execute(
            "UPDATE secrets SET status = ?2, last_modified = MAX(?3, last_modified + 1)
             WHERE local_id = ?1 AND secret_id IS NOT NULL",
            params![local_id, SecretStatus::Deleted.as_i64(), now_micros()],
        )?;
        if marked == 0 {
            return Err(StoreError::NotFound(local_id));
        }
        Ok(DeleteOutcome::MarkedDeleted)
    }

    // --- Sync-facing operations ---

    /// Record the server's answer to a push.
    ///
    /// The id and version are always stored. The status becomes ACTUAL only
    /// when the row is unchanged since `expected_last_modified`; a NEW row
    /// edited mid-push becomes EDITED, any other status is kept. Returns the
    /// resulting status, or `None` when the row no longer exists.
    pub fn mark_pushed(
        &self,
        local_id: i64,
        expected_last_modified: i64,
        secret_id: &Uuid,
        version: i64,
    ) -> StoreResult<Option<SecretStatus>> {
        let conn = self.conn()?;
        let status = conn
            .query_row(
                "UPDATE secrets SET
                    secret_id = ?3,
                    version = ?4,
                    status = CASE
                        WHEN last_modified = ?2 THEN ?5
                        WHEN status = ?6 THEN ?7
                        ELSE status
                    END,
                    last_modified = MAX(?8, last_modified + 1)
                 WHERE local_id = ?1
                 RETURNING status",
                params![
                    local_id,
                    expected_last_modified,
                    secret_id.to_string(),
                    version,
                    SecretStatus::Actual.as_i64(),
                    SecretStatus::New.as_i64(),
                    SecretStatus::Edited.as_i64(),
                    now_micros(),
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    /// Store a record pulled from the server as ACTUAL.
    ///
    /// Inserts when no row has this secret id. An existing row is only
    /// overwritten when `expected_last_modified` is `None` or matches.
    /// Returns the local id, or `None` when a concurrent local write won.
    pub fn upsert_remote(
        &self,
        secret_id: &Uuid,
        version: i64,
        header: &SecretHeader,
        ciphertext: &str,
        expected_last_modified: Option<i64>,
    ) -> StoreResult<Option<i64>> {
        let conn = self.conn()?;
        let local_id = conn
            .query_row(
                "INSERT INTO secrets (secret_id, version, status, type_id, title, description,
                                      ciphertext, last_modified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(secret_id) DO UPDATE SET
                    version = excluded.version,
                    status = excluded.status,
                    type_id = excluded.type_id,
                    title = excluded.title,
                    description = excluded.description,
                    ciphertext = excluded.ciphertext,
                    last_modified = MAX(excluded.last_modified, secrets.last_modified + 1)
                 WHERE ?9 IS NULL OR secrets.last_modified = ?9
                 RETURNING local_id",
                params![
                    secret_id.to_string(),
                    version,
                    SecretStatus::Actual.as_i64(),
                    header.type_id,
                    header.title,
                    header.description,
                    ciphertext,
                    now_micros(),
                    expected_last_modified,
                ],
                |row| row.get(0),
            )
            .optional()?;
        Ok(local_id)
    }

    /// The server no longer has this record: mark it DELETED if unchanged.
    pub fn mark_remote_deleted(
        &self,
        local_id: i64,
        expected_last_modified: i64,
    ) -> StoreResult<bool> {
        self.conditional_write(
            "UPDATE secrets SET status = ?3, last_modified = MAX(?4, last_modified + 1)
             WHERE local_id = ?1 AND last_modified = ?2",
            local_id,
            expected_last_modified,
            SecretStatus::Deleted.as_i64(),
        )
    }

    /// Keep the local content as an edit on top of remote `version`.
    pub fn rebase(
        &self,
        local_id: i64,
        expected_last_modified: i64,
        version: i64,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE secrets SET version = ?3, status = ?4,
                                last_modified = MAX(?5, last_modified + 1)
             WHERE local_id = ?1 AND last_modified = ?2",
            params![
                local_id,
                expected_last_modified,
                version,
                SecretStatus::Edited.as_i64(),
                now_micros(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Forget the server binding so the next sync adds the record again.
    pub fn detach(
        &self,
        local_id: i64,
        expected_last_modified: i64,
    ) -> StoreResult<bool> {
        self.conditional_write(
            "UPDATE secrets SET secret_id = NULL, version = 1, status = ?3,
                                last_modified = MAX(?4, last_modified + 1)
             WHERE local_id = ?1 AND last_modified = ?2",
            local_id,
            expected_last_modified,
            SecretStatus::New.as_i64(),
        )
    }

    /// Remove a DELETED row once the server has acknowledged the delete.
    pub fn purge(&self, local_id: i64) -> StoreResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM secrets WHERE local_id = ?1 AND status = ?2",
            params![local_id, SecretStatus::Deleted.as_i64()],
        )?;
        Ok(removed > 0)
    }

    // --- Metadata ---

    pub fn metadata(&self) -> StoreResult<SyncMetadata> {
        let conn = self.conn()?;
        SyncMetadata::load(&conn)
    }

    pub fn save_metadata(&self, metadata: &SyncMetadata) -> StoreResult<()> {
        let conn = self.conn()?;
        metadata.save(&conn)
    }

    /// Claim the sync lease for `owner` until the unix time `until`.
    ///
    /// The lease lives in the database, so it also excludes passes from
    /// other processes opening the same vault file. Returns `false` while
    /// another owner holds an unexpired lease. The current owner may call
    /// this again to extend it.
    pub fn acquire_sync_lease(&self, owner: &Uuid, until: i64) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE sync_metadata SET sync_lease_owner = ?1, sync_lease_until = ?2
             WHERE id = 1
               AND (sync_lease_owner IS NULL OR sync_lease_owner = ?1 OR sync_lease_until < ?3)",
            params![owner.to_string(), until, chrono::Utc::now().timestamp()],
        )?;
        Ok(changed > 0)
    }

    /// Drop the lease if `owner` still holds it.
    pub fn release_sync_lease(&self, owner: &Uuid) -> StoreResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_metadata SET sync_lease_owner = NULL, sync_lease_until = NULL
             WHERE id = 1 AND sync_lease_owner = ?1",
            params![owner.to_string()],
        )?;
        Ok(())
    }

    fn conditional_write(
        &self,
        sql: &str,
        local_id: i64,
        expected_last_modified: i64,
        status: i64,
    ) -> StoreResult<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            sql,
            params![local_id, expected_last_modified, status, now_micros()],
        )?;
        Ok(changed > 0)
    }
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Work out why a conditional update matched nothing.
fn explain_miss(conn: &Connection, local_id: i64) -> StoreResult<StoreError> {
    let status: Option<SecretStatus> = conn
        .query_row(
            "SELECT status FROM secrets WHERE local_id = ?1",
            params![local_id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(match status {
        None => StoreError::NotFound(local_id),
        Some(SecretStatus::Deleted) => StoreError::ItemIsDeleted(local_id),
        Some(_) => StoreError::StaleWrite(local_id),
    })
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<SecretRecord> {
    Ok(SecretRecord {
        local_id: row.get(0)?,
        secret_id: secret_id_column(row, 1)?,
        version: row.get(2)?,
        status: row.get(3)?,
        type_id: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        ciphertext: row.get(7)?,
        last_modified: row.get(8)?,
    })
}

fn secret_id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    let value: Option<String> = row.get(idx)?;
    value
        .map(|s| {
            Uuid::parse_str(&s).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
            })
        })
        .transpose()
}

impl FromSql for SecretStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let raw = i64::column_result(value)?;
        SecretStatus::from_i64(raw).ok_or(FromSqlError::OutOfRange(raw))
    }
}

impl ToSql for SecretStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}
