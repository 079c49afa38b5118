//! Secret service: validation, ownership and optimistic versioning.

use crate::error::ServiceError;
use crate::storage::models::StoredSecret;
use crate::storage::{secrets, ServerStorage};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Body of `PUT /api/secret`. No id (or the nil id) means Add.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub ver: i64,
    pub data: String,
}

impl SecretRequest {
    fn target(&self) -> Option<Uuid> {
        self.id.filter(|id| !id.is_nil())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    pub id: Uuid,
    pub ver: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretResponse {
    pub id: Uuid,
    pub ver: i64,
    pub data: String,
}

#[derive(Clone)]
pub struct SecretService {
    storage: ServerStorage,
}

impl SecretService {
    pub fn new(storage: ServerStorage) -> Self {
        Self { storage }
    }

    /// Add or update depending on whether the request names an id.
    pub fn upsert(
        &self,
        user_id: &Uuid,
        req: &SecretRequest,
    ) -> Result<SecretVersion, ServiceError> {
        match req.target() {
            None => self.add(user_id, req),
            Some(id) => self.update(user_id, &id, req),
        }
    }

    /// Store a new secret. The server picks the id; the version is always 1.
    pub fn add(&self, user_id: &Uuid, req: &SecretRequest) -> Result<SecretVersion, ServiceError> {
        validate_new_secret(req)?;

        let secret = StoredSecret {
            id: Uuid::new_v4(),
            user_id: *user_id,
            version: 1,
            data: req.data.clone(),
            is_deleted: false,
            updated_at: Utc::now().timestamp(),
        };
        let conn = self.storage.conn()?;
        secrets::insert(&conn, &secret)?;

        tracing::debug!("User {} added secret {}", user_id, secret.id);
        Ok(SecretVersion {
            id: secret.id,
            ver: secret.version,
        })
    }

    /// Replace a secret's data if the caller has seen the current version.
    pub fn update(
        &self,
        user_id: &Uuid,
        id: &Uuid,
        req: &SecretRequest,
    ) -> Result<SecretVersion, ServiceError> {
        validate_update(req)?;

        let conn = self.storage.conn()?;
        let existing = secrets::find(&conn, id, user_id)?.ok_or(ServiceError::NotFound)?;
        if existing.is_deleted {
            return Err(ServiceError::ItemIsDeleted);
        }
        if existing.version > req.ver {
            return Err(ServiceError::VersionTooLow);
        }

        let ver = secrets::bump_version(
            &conn,
            id,
            user_id,
            existing.version,
            &req.data,
            Utc::now().timestamp(),
        )?
        .ok_or(ServiceError::VersionTooLow)?;

        tracing::debug!("User {} updated secret {} to version {}", user_id, id, ver);
        Ok(SecretVersion { id: *id, ver })
    }

    pub fn get(&self, user_id: &Uuid, id: &Uuid) -> Result<SecretResponse, ServiceError> {
        let conn = self.storage.conn()?;
        let secret = secrets::find(&conn, id, user_id)?
            .filter(|s| !s.is_deleted)
            .ok_or(ServiceError::NotFound)?;

        Ok(SecretResponse {
            id: secret.id,
            ver: secret.version,
            data: secret.data,
        })
    }

    /// Soft delete. Repeating it on an already deleted secret succeeds.
    pub fn delete(&self, user_id: &Uuid, id: &Uuid) -> Result<(), ServiceError> {
        let conn = self.storage.conn()?;
        if !secrets::soft_delete(&conn, id, user_id, Utc::now().timestamp())? {
            return Err(ServiceError::NotFound);
        }
        tracing::debug!("User {} deleted secret {}", user_id, id);
        Ok(())
    }

    pub fn version_list(&self, user_id: &Uuid) -> Result<BTreeMap<Uuid, i64>, ServiceError> {
        let conn = self.storage.conn()?;
        Ok(secrets::version_list(&conn, user_id)?)
    }
}

pub fn validate_new_secret(req: &SecretRequest) -> Result<(), ServiceError> {
    if req.target().is_some() {
        return Err(ServiceError::Validation("id must be empty for a new secret".to_string()));
    }
    validate_body(req)
}

pub fn validate_update(req: &SecretRequest) -> Result<(), ServiceError> {
    if req.target().is_none() {
        return Err(ServiceError::Validation("id is required".to_string()));
    }
    validate_body(req)
}

fn validate_body(req: &SecretRequest) -> Result<(), ServiceError> {
    if req.ver < 1 {
        return Err(ServiceError::Validation("ver must be at least 1".to_string()));
    }
    if req.data.is_empty() {
        return Err(ServiceError::Validation("data is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::StoredUser;
    use crate::storage::users;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn user(storage: &ServerStorage, login: &str) -> Uuid {
        let id = Uuid::new_v4();
        users::insert(
            &storage.conn().unwrap(),
            &StoredUser {
                id,
                login: login.to_string(),
                password_hash: "x".to_string(),
                master_hash: "y".to_string(),
                created_at: 0,
            },
        )
        .unwrap();
        id
    }

    fn setup() -> (SecretService, Uuid, Uuid) {
        let storage = ServerStorage::in_memory().unwrap();
        let alice = user(&storage, "alice");
        let bob = user(&storage, "bob");
        (SecretService::new(storage), alice, bob)
    }

    fn req(id: Option<Uuid>, ver: i64, data: &str) -> SecretRequest {
        SecretRequest {
            id,
            ver,
            data: data.to_string(),
        }
    }

    #[test]
    fn add_update_stale_scenario() {
        let (svc, u, _) = setup();

        let added = svc.upsert(&u, &req(None, 1, "d1")).unwrap();
        assert_eq!(added.ver, 1);
        let x = added.id;

        assert_eq!(
            svc.upsert(&u, &req(Some(x), 1, "d2")).unwrap(),
            SecretVersion { id: x, ver: 2 }
        );
        assert_eq!(
            svc.upsert(&u, &req(Some(x), 1, "d3")).unwrap_err(),
            ServiceError::VersionTooLow
        );

        assert_eq!(svc.get(&u, &x).unwrap().data, "d2");
        assert_eq!(svc.version_list(&u).unwrap(), BTreeMap::from([(x, 2)]));
    }

    #[test]
    fn add_ignores_client_version() {
        let (svc, u, _) = setup();
        let added = svc.upsert(&u, &req(None, 7, "d")).unwrap();
        assert_eq!(added.ver, 1);

        // The nil id also means Add
        let nil = svc.upsert(&u, &req(Some(Uuid::nil()), 1, "d")).unwrap();
        assert_ne!(nil.id, Uuid::nil());
    }

    #[test]
    fn version_is_monotonic() {
        let (svc, u, _) = setup();
        let x = svc.add(&u, &req(None, 1, "d")).unwrap().id;

        for n in 1..=5 {
            let ver = svc.update(&u, &x, &req(Some(x), n, "d")).unwrap().ver;
            assert_eq!(ver, n + 1);
        }
        assert_eq!(svc.get(&u, &x).unwrap().ver, 6);
    }

    #[test]
    fn concurrent_updates_have_one_winner() {
        let (svc, u, _) = setup();
        let x = svc.add(&u, &req(None, 1, "d")).unwrap().id;
        svc.update(&u, &x, &req(Some(x), 1, "d")).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = ["from-a", "from-b"]
            .into_iter()
            .map(|data| {
                let svc = svc.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    (data, svc.update(&u, &x, &req(Some(x), 2, data)))
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter(|(_, r)| r.is_ok()).collect();
        assert_eq!(winners.len(), 1);
        let (winning_data, winning) = winners[0];
        assert_eq!(winning.as_ref().unwrap(), &SecretVersion { id: x, ver: 3 });

        let loser = results.iter().find(|(_, r)| r.is_err()).unwrap();
        assert_eq!(loser.1.as_ref().unwrap_err(), &ServiceError::VersionTooLow);

        let stored = svc.get(&u, &x).unwrap();
        assert_eq!((stored.ver, stored.data.as_str()), (3, *winning_data));
    }

    #[test]
    fn client_version_never_adopted() {
        let (svc, u, _) = setup();
        let x = svc.add(&u, &req(None, 1, "d")).unwrap().id;

        let ver = svc.update(&u, &x, &req(Some(x), 100, "d2")).unwrap().ver;
        assert_eq!(ver, 2);
    }

    #[test]
    fn ownership_isolation() {
        let (svc, alice, bob) = setup();
        let x = svc.add(&alice, &req(None, 1, "alice's")).unwrap().id;

        assert_eq!(svc.get(&bob, &x).unwrap_err(), ServiceError::NotFound);
        assert_eq!(
            svc.update(&bob, &x, &req(Some(x), 1, "bob's")).unwrap_err(),
            ServiceError::NotFound
        );
        assert_eq!(svc.delete(&bob, &x).unwrap_err(), ServiceError::NotFound);
        assert!(svc.version_list(&bob).unwrap().is_empty());

        let stored = svc.get(&alice, &x).unwrap();
        assert_eq!((stored.ver, stored.data.as_str()), (1, "alice's"));
    }

    #[test]
    fn delete_semantics() {
        let (svc, u, _) = setup();
        let x = svc.add(&u, &req(None, 1, "d")).unwrap().id;

        svc.delete(&u, &x).unwrap();
        svc.delete(&u, &x).unwrap();

        assert!(svc.version_list(&u).unwrap().is_empty());
        assert_eq!(svc.get(&u, &x).unwrap_err(), ServiceError::NotFound);
        assert_eq!(
            svc.update(&u, &x, &req(Some(x), 1, "d2")).unwrap_err(),
            ServiceError::ItemIsDeleted
        );
        assert_eq!(svc.delete(&u, &Uuid::new_v4()).unwrap_err(), ServiceError::NotFound);
    }

    #[test]
    fn validation() {
        assert!(validate_new_secret(&req(None, 1, "d")).is_ok());
        assert!(validate_new_secret(&req(Some(Uuid::new_v4()), 1, "d")).is_err());
        assert!(validate_new_secret(&req(None, 0, "d")).is_err());
        assert!(validate_new_secret(&req(None, 1, "")).is_err());

        assert!(validate_update(&req(Some(Uuid::new_v4()), 1, "d")).is_ok());
        assert!(validate_update(&req(None, 1, "d")).is_err());
        assert!(validate_update(&req(Some(Uuid::nil()), 1, "d")).is_err());
    }
}
