//! Secret rows, always scoped by owner.

use super::models::StoredSecret;
use super::users::parse_uuid;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn insert(conn: &Connection, secret: &StoredSecret) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO secrets (id, user_id, version, data, is_deleted, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            secret.id.to_string(),
            secret.user_id.to_string(),
            secret.version,
            secret.data,
            secret.is_deleted,
            secret.updated_at,
        ],
    )?;
    Ok(())
}

/// Fetch a secret owned by `user_id`, deleted or not.
pub fn find(
    conn: &Connection,
    id: &Uuid,
    user_id: &Uuid,
) -> rusqlite::Result<Option<StoredSecret>> {
    conn.query_row(
        "SELECT id, user_id, version, data, is_deleted, updated_at
         FROM secrets WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string()],
        |row| {
            let id: String = row.get(0)?;
            let user_id: String = row.get(1)?;
            Ok(StoredSecret {
                id: parse_uuid(0, &id)?,
                user_id: parse_uuid(1, &user_id)?,
                version: row.get(2)?,
                data: row.get(3)?,
                is_deleted: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
    .optional()
}

/// Compare-and-increment: replace the data only if the stored version is
/// still `expected_version`. Returns the new version, or `None` if another
/// writer got there first.
pub fn bump_version(
    conn: &Connection,
    id: &Uuid,
    user_id: &Uuid,
    expected_version: i64,
    data: &str,
    now: i64,
) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "UPDATE secrets SET data = ?4, version = version + 1, updated_at = ?5
         WHERE id = ?1 AND user_id = ?2 AND version = ?3 AND is_deleted = 0
         RETURNING version",
        params![id.to_string(), user_id.to_string(), expected_version, data, now],
        |row| row.get(0),
    )
    .optional()
}

/// Soft delete. Returns `false` when the owner has no such secret.
pub fn soft_delete(
    conn: &Connection,
    id: &Uuid,
    user_id: &Uuid,
    now: i64,
) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE secrets SET is_deleted = 1,
                updated_at = CASE WHEN is_deleted = 1 THEN updated_at ELSE ?3 END
         WHERE id = ?1 AND user_id = ?2",
        params![id.to_string(), user_id.to_string(), now],
    )?;
    Ok(changed > 0)
}

/// Manifest of the owner's non-deleted secrets.
pub fn version_list(conn: &Connection, user_id: &Uuid) -> rusqlite::Result<BTreeMap<Uuid, i64>> {
    let mut stmt = conn.prepare(
        "SELECT id, version FROM secrets WHERE user_id = ?1 AND is_deleted = 0",
    )?;
    let rows = stmt.query_map(params![user_id.to_string()], |row| {
        let id: String = row.get(0)?;
        Ok((parse_uuid(0, &id)?, row.get::<_, i64>(1)?))
    })?;
    rows.collect()
}
