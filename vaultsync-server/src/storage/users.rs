//! User rows.

use super::models::StoredUser;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

/// Insert a user. Returns `false` when the login is taken.
pub fn insert(conn: &Connection, user: &StoredUser) -> rusqlite::Result<bool> {
    let result = conn.execute(
        "INSERT INTO users (id, login, password_hash, master_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id.to_string(),
            user.login,
            user.password_hash,
            user.master_hash,
            user.created_at,
        ],
    );

    match result {
        Ok(_) => Ok(true),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

pub fn find_by_login(conn: &Connection, login: &str) -> rusqlite::Result<Option<StoredUser>> {
    conn.query_row(
        "SELECT id, login, password_hash, master_hash, created_at FROM users WHERE login = ?1",
        params![login],
        |row| {
            let id: String = row.get(0)?;
            Ok(StoredUser {
                id: parse_uuid(0, &id)?,
                login: row.get(1)?,
                password_hash: row.get(2)?,
                master_hash: row.get(3)?,
                created_at: row.get(4)?,
            })
        },
    )
    .optional()
}

pub(crate) fn parse_uuid(idx: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
