//! Server storage model types.

use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: Uuid,
    pub login: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    /// Argon2id PHC string over the client's master hash.
    pub master_hash: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    pub id: Uuid,
    pub user_id: Uuid,
    pub version: i64,
    pub data: String,
    pub is_deleted: bool,
    pub updated_at: i64,
}
