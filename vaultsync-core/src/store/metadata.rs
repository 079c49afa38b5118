//! Per-vault sync metadata stored in the local database.

use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{StoreError, StoreResult};

/// One-row table describing this device and its server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub device_id: Uuid,
    pub login: Option<String>,
    pub server_url: Option<String>,
    pub token: Option<String>,
    /// Envelope of a fixed marker, used to reject a wrong master key early.
    pub key_check: Option<String>,
    pub last_sync_at: Option<i64>,
}

impl SyncMetadata {
    pub fn new(device_id: Uuid) -> Self {
        Self {
            device_id,
            login: None,
            server_url: None,
            token: None,
            key_check: None,
            last_sync_at: None,
        }
    }

    /// Load metadata. The row is created when the schema is initialized.
    pub fn load(conn: &rusqlite::Connection) -> StoreResult<Self> {
        let row = conn
            .query_row(
                "SELECT device_id, login, server_url, token, key_check, last_sync_at
                 FROM sync_metadata WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                    ))
                },
            )
            .optional()?;

        let (device_id, login, server_url, token, key_check, last_sync_at) =
            row.ok_or_else(|| StoreError::Corrupt("sync metadata row missing".to_string()))?;

        let device_id = Uuid::parse_str(&device_id)
            .map_err(|e| StoreError::Corrupt(format!("invalid device id: {}", e)))?;

        Ok(Self {
            device_id,
            login,
            server_url,
            token,
            key_check,
            last_sync_at,
        })
    }

    /// Save metadata (upsert).
    pub fn save(&self, conn: &rusqlite::Connection) -> StoreResult<()> {
        conn.execute(
            "INSERT INTO sync_metadata
                 (id, device_id, login, server_url, token, key_check, last_sync_at)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                device_id = excluded.device_id,
                login = excluded.login,
                server_url = excluded.server_url,
                token = excluded.token,
                key_check = excluded.key_check,
                last_sync_at = excluded.last_sync_at",
            rusqlite::params![
                self.device_id.to_string(),
                self.login,
                self.server_url,
                self.token,
                self.key_check,
                self.last_sync_at,
            ],
        )?;

        Ok(())
    }
}
