//! Sync data models: the JSON bodies exchanged with the server.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Error messages the server uses for each 422 condition.
///
/// Both sides agree on these strings; anything else under 422 is a
/// validation failure.
pub mod messages {
    pub const NOT_FOUND: &str = "secret not found";
    pub const VERSION_TOO_LOW: &str = "version too low";
    pub const ITEM_IS_DELETED: &str = "secret is deleted";
    pub const WRONG_AUTH_DATA: &str = "wrong auth data";
    pub const CONFLICT_SAVE_USER: &str = "login already exists";
}

/// Server manifest: secret id to current version, non-deleted only.
pub type VersionList = BTreeMap<Uuid, i64>;

/// Body of `PUT /api/secret`. No id (or the nil id) means Add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub ver: i64,
    pub data: String,
}

/// `{id, ver}` returned by a successful upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub id: Uuid,
    pub ver: i64,
}

/// A secret as the server stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSecret {
    pub id: Uuid,
    pub ver: i64,
    pub data: String,
}

/// Body of `GET`/`DELETE /api/secret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretIdRequest {
    pub id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionListResponse {
    pub list: VersionList,
}

/// Body of `POST /api/user/register` and `/api/user/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
    pub master_hash: String,
    pub device_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_request_omits_id() {
        let req = SecretRequest {
            id: None,
            ver: 1,
            data: "abc".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&req).unwrap(),
            r#"{"ver":1,"data":"abc"}"#
        );
    }

    #[test]
    fn version_list_uses_string_keys() {
        let id = Uuid::parse_str("6f2c3a4e-1b2d-4c3e-8f9a-0b1c2d3e4f50").unwrap();
        let resp = VersionListResponse {
            list: BTreeMap::from([(id, 3)]),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert_eq!(json, r#"{"list":{"6f2c3a4e-1b2d-4c3e-8f9a-0b1c2d3e4f50":3}}"#);
        assert_eq!(serde_json::from_str::<VersionListResponse>(&json).unwrap(), resp);
    }
}
