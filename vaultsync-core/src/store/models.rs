//! Row types for the local vault store.

use crate::secret::SecretHeader;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Sync status of a local record.
///
/// `New` has never reached the server, `Edited` has unpushed changes,
/// `Actual` matches the server, `Deleted` is waiting for its delete to be
/// pushed and is immutable until purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStatus {
    New,
    Edited,
    Actual,
    Deleted,
}

impl SecretStatus {
    pub fn as_i64(self) -> i64 {
        match self {
            SecretStatus::New => 1,
            SecretStatus::Edited => 2,
            SecretStatus::Actual => 3,
            SecretStatus::Deleted => 4,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(SecretStatus::New),
            2 => Some(SecretStatus::Edited),
            3 => Some(SecretStatus::Actual),
            4 => Some(SecretStatus::Deleted),
            _ => None,
        }
    }
}

impl fmt::Display for SecretStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretStatus::New => "new",
            SecretStatus::Edited => "edited",
            SecretStatus::Actual => "actual",
            SecretStatus::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// A full local row, envelope included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub local_id: i64,
    pub secret_id: Option<Uuid>,
    pub version: i64,
    pub status: SecretStatus,
    pub type_id: i64,
    pub title: String,
    pub description: String,
    pub ciphertext: String,
    pub last_modified: i64,
}

impl SecretRecord {
    pub fn header(&self) -> SecretHeader {
        SecretHeader {
            type_id: self.type_id,
            title: self.title.clone(),
            description: self.description.clone(),
        }
    }
}

/// Listing row: everything except the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretMeta {
    pub local_id: i64,
    pub secret_id: Option<Uuid>,
    pub version: i64,
    pub status: SecretStatus,
    pub type_id: i64,
    pub title: String,
    pub description: String,
    pub last_modified: i64,
}

/// Outcome of a soft delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// Never synced, so the row is gone.
    Removed,
    /// Marked DELETED, to be pushed on the next sync.
    MarkedDeleted,
}
