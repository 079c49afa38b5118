use super::*;
use crate::crypto::MasterKey;
use crate::secret::{Secret, SecretBody};
use crate::store::LocalStore;
use crate::sync::models::SecretVersion;
use crate::sync::ConflictPolicy;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredSecret {
    ver: i64,
    data: String,
    deleted: bool,
}

/// In-memory stand-in for the server's secret store, scoped to one user.
#[derive(Default)]
struct FakeRemote {
    secrets: Mutex<HashMap<Uuid, StoredSecret>>,
    fail_updates: Mutex<HashSet<Uuid>>,
    unauthorized: AtomicBool,
    manifest_delay: Option<Duration>,
    hang_gets: AtomicBool,
    cancel_after_add: Option<SyncCancel>,
    /// Soft-deleted right after the manifest is built.
    delete_after_manifest: Mutex<HashSet<Uuid>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakeRemote {
    fn log(&self, call: &'static str) -> RemoteResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.unauthorized.load(Ordering::SeqCst) {
            return Err(RemoteError::Unauthorized);
        }
        Ok(())
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Server-side write from another device.
    fn put(&self, id: Uuid, ver: i64, data: String) {
        self.secrets.lock().unwrap().insert(
            id,
            StoredSecret {
                ver,
                data,
                deleted: false,
            },
        );
    }

    fn stored(&self, id: &Uuid) -> Option<StoredSecret> {
        self.secrets.lock().unwrap().get(id).cloned()
    }

    fn soft_delete(&self, id: &Uuid) {
        if let Some(s) = self.secrets.lock().unwrap().get_mut(id) {
            s.deleted = true;
        }
    }
}

impl SecretRemote for FakeRemote {
    async fn version_list(&self) -> RemoteResult<VersionList> {
        self.log("version_list")?;
        if let Some(delay) = self.manifest_delay {
            tokio::time::sleep(delay).await;
        }
        let manifest = self
            .secrets
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s)| !s.deleted)
            .map(|(id, s)| (*id, s.ver))
            .collect();
        for id in self.delete_after_manifest.lock().unwrap().drain() {
            self.soft_delete(&id);
        }
        Ok(manifest)
    }

    async fn get(&self, id: Uuid) -> RemoteResult<RemoteSecret> {
        self.log("get")?;
        if self.hang_gets.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        match self.stored(&id) {
            Some(s) if !s.deleted => Ok(RemoteSecret {
                id,
                ver: s.ver,
                data: s.data,
            }),
            _ => Err(RemoteError::NotFound),
        }
    }

    async fn add(&self, _ver: i64, data: &str) -> RemoteResult<SecretVersion> {
        self.log("add")?;
        let id = Uuid::new_v4();
        self.put(id, 1, data.to_string());
        if let Some(cancel) = &self.cancel_after_add {
            cancel.cancel();
        }
        Ok(SecretVersion { id, ver: 1 })
    }

    async fn update(&self, id: Uuid, ver: i64, data: &str) -> RemoteResult<SecretVersion> {
        self.log("update")?;
        if self.fail_updates.lock().unwrap().contains(&id) {
            return Err(RemoteError::Transport("connection reset".to_string()));
        }
        let mut secrets = self.secrets.lock().unwrap();
        let existing = secrets.get_mut(&id).ok_or(RemoteError::NotFound)?;
        if existing.deleted {
            return Err(RemoteError::ItemIsDeleted);
        }
        if existing.ver > ver {
            return Err(RemoteError::VersionTooLow);
        }
        existing.ver += 1;
        existing.data = data.to_string();
        Ok(SecretVersion {
            id,
            ver: existing.ver,
        })
    }

    async fn delete(&self, id: Uuid) -> RemoteResult<()> {
        self.log("delete")?;
        let mut secrets = self.secrets.lock().unwrap();
        let existing = secrets.get_mut(&id).ok_or(RemoteError::NotFound)?;
        existing.deleted = true;
        Ok(())
    }
}

fn note(title: &str, text: &str) -> Secret {
    Secret::new(title, "", SecretBody::Text { text: text.to_string() })
}

fn vault_with_key(key: &MasterKey) -> Vault {
    Vault::new(LocalStore::in_memory().unwrap(), key.clone())
}

fn coordinator(
    vault: Vault,
    remote: FakeRemote,
    policy: ConflictPolicy,
) -> SyncCoordinator<FakeRemote> {
    SyncCoordinator::new(
        vault,
        remote,
        SyncOptions {
            request_timeout: Duration::from_millis(200),
            conflict_policy: policy,
        },
    )
}

fn fresh_coordinator(remote: FakeRemote, policy: ConflictPolicy) -> SyncCoordinator<FakeRemote> {
    coordinator(vault_with_key(&MasterKey::generate()), remote, policy)
}

/// One NEW secret pushed through a fresh coordinator; returns its ids.
async fn synced_note(
    coord: &SyncCoordinator<FakeRemote>,
    title: &str,
) -> (i64, Uuid) {
    let local_id = coord.vault().add(&note(title, "v1")).unwrap();
    coord.run().await.unwrap();
    let record = coord.vault().store().get(local_id).unwrap();
    (local_id, record.secret_id.unwrap())
}

#[tokio::test]
async fn new_record_is_pushed_then_pass_is_noop() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let local_id = coord.vault().add(&note("wifi", "pass")).unwrap();

    let report = coord.run().await.unwrap();
    assert_eq!(report.added, 1);
    assert!(report.is_clean());

    let record = coord.vault().store().get(local_id).unwrap();
    assert_eq!(record.status, SecretStatus::Actual);
    assert_eq!(record.version, 1);
    let id = record.secret_id.unwrap();
    assert_eq!(coord.remote().stored(&id).unwrap().data, record.ciphertext);

    let second = coord.run().await.unwrap();
    assert_eq!(second.changes(), 0);
    assert!(second.conflicts.is_empty());
    assert_eq!(coord.vault().store().get(local_id).unwrap(), record);
    assert!(coord.vault().store().metadata().unwrap().last_sync_at.is_some());
}

#[tokio::test]
async fn edited_record_is_pushed_with_next_version() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let (local_id, id) = synced_note(&coord, "a").await;

    let seen = coord.vault().read(local_id).unwrap().last_modified;
    coord.vault().edit(local_id, seen, &note("a", "v2")).unwrap();
    assert_eq!(coord.vault().store().get(local_id).unwrap().status, SecretStatus::Edited);

    let report = coord.run().await.unwrap();
    assert_eq!(report.updated, 1);

    let record = coord.vault().store().get(local_id).unwrap();
    assert_eq!(record.status, SecretStatus::Actual);
    assert_eq!(record.version, 2);
    assert_eq!(coord.remote().stored(&id).unwrap().ver, 2);
}

#[tokio::test]
async fn deleted_record_is_pushed_and_purged() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let (local_id, id) = synced_note(&coord, "a").await;

    coord.vault().delete(local_id).unwrap();
    let report = coord.run().await.unwrap();

    assert_eq!(report.deleted, 1);
    assert!(coord.remote().stored(&id).unwrap().deleted);
    assert!(coord.vault().store().get(local_id).unwrap_err().is_not_found());
}

#[tokio::test]
async fn delete_of_already_gone_record_still_purges() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let (local_id, id) = synced_note(&coord, "a").await;

    coord.remote().secrets.lock().unwrap().remove(&id);
    coord.vault().delete(local_id).unwrap();

    let report = coord.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(coord.vault().store().get(local_id).unwrap_err().is_not_found());
}

#[tokio::test]
async fn actual_record_behind_manifest_is_pulled() {
    let key = MasterKey::generate();
    let coord = coordinator(
        vault_with_key(&key),
        FakeRemote::default(),
        ConflictPolicy::RemoteWins,
    );
    let (local_id, id) = synced_note(&coord, "a").await;

    // Another device edits it twice
    let other = vault_with_key(&key);
    let (_, data) = other.seal_secret(&note("a renamed", "v3")).unwrap();
    coord.remote().put(id, 3, data);

    let report = coord.run().await.unwrap();
    assert_eq!(report.pulled, 1);

    let item = coord.vault().read(local_id).unwrap();
    assert_eq!(item.version, 3);
    assert_eq!(item.status, SecretStatus::Actual);
    assert_eq!(item.secret, note("a renamed", "v3"));
}

#[tokio::test]
async fn actual_record_missing_from_manifest_becomes_deleted() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let (local_id, id) = synced_note(&coord, "a").await;

    coord.remote().soft_delete(&id);
    let report = coord.run().await.unwrap();
    assert_eq!(report.remote_deleted, 1);
    assert_eq!(coord.vault().store().get(local_id).unwrap().status, SecretStatus::Deleted);

    // The following pass acknowledges the delete and purges the row
    let report = coord.run().await.unwrap();
    assert_eq!(report.deleted, 1);
    assert!(coord.vault().store().list_meta().unwrap().is_empty());
}

#[tokio::test]
async fn unseen_remote_secret_is_inserted() {
    let key = MasterKey::generate();
    let coord = coordinator(
        vault_with_key(&key),
        FakeRemote::default(),
        ConflictPolicy::RemoteWins,
    );

    let other = vault_with_key(&key);
    let (_, data) = other.seal_secret(&note("from phone", "hello")).unwrap();
    let id = Uuid::new_v4();
    coord.remote().put(id, 4, data);

    let report = coord.run().await.unwrap();
    assert_eq!(report.pulled, 1);

    let record = coord.vault().store().get_by_secret_id(&id).unwrap().unwrap();
    assert_eq!(record.status, SecretStatus::Actual);
    assert_eq!(record.version, 4);
    assert_eq!(record.title, "from phone");
    assert_eq!(coord.vault().read(record.local_id).unwrap().secret, note("from phone", "hello"));
}

#[tokio::test]
async fn undecodable_remote_secret_is_a_per_record_failure() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let local_id = coord.vault().add(&note("mine", "x")).unwrap();

    // Sealed under a different key
    let foreign = vault_with_key(&MasterKey::generate());
    let (_, data) = foreign.seal_secret(&note("theirs", "y")).unwrap();
    let id = Uuid::new_v4();
    coord.remote().put(id, 1, data);

    let report = coord.run().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].secret_id, Some(id));
    assert!(coord.vault().store().get_by_secret_id(&id).unwrap().is_none());
    assert_eq!(coord.vault().store().get(local_id).unwrap().status, SecretStatus::Actual);
}

/// Device A and device B both edit the same secret; B pushes first.
async fn stale_edit_setup(
    policy: ConflictPolicy,
) -> (SyncCoordinator<FakeRemote>, i64, Uuid, MasterKey) {
    let key = MasterKey::generate();
    let coord = coordinator(vault_with_key(&key), FakeRemote::default(), policy);
    let (local_id, id) = synced_note(&coord, "shared").await;

    let seen = coord.vault().read(local_id).unwrap().last_modified;
    coord.vault().edit(local_id, seen, &note("shared", "mine")).unwrap();

    let other = vault_with_key(&key);
    let (_, data) = other.seal_secret(&note("shared", "theirs")).unwrap();
    coord.remote().put(id, 2, data);

    (coord, local_id, id, key)
}

#[tokio::test]
async fn version_too_low_remote_wins() {
    let (coord, local_id, id, _) = stale_edit_setup(ConflictPolicy::RemoteWins).await;

    let report = coord.run().await.unwrap();
    assert_eq!(
        report.conflicts,
        vec![SyncConflict {
            local_id,
            secret_id: id,
            kind: ConflictKind::StaleVersion,
            resolution: Resolution::AcceptRemote,
        }]
    );

    let item = coord.vault().read(local_id).unwrap();
    assert_eq!(item.status, SecretStatus::Actual);
    assert_eq!(item.version, 2);
    assert_eq!(item.secret, note("shared", "theirs"));
    assert_eq!(coord.remote().stored(&id).unwrap().ver, 2);
}

#[tokio::test]
async fn version_too_low_keep_local() {
    let (coord, local_id, id, _) = stale_edit_setup(ConflictPolicy::KeepLocal).await;

    let report = coord.run().await.unwrap();
    assert_eq!(report.conflicts.len(), 1);
    assert_eq!(report.conflicts[0].resolution, Resolution::KeepLocal);

    let item = coord.vault().read(local_id).unwrap();
    assert_eq!(item.status, SecretStatus::Edited);
    assert_eq!(item.version, 2);
    assert_eq!(item.secret, note("shared", "mine"));

    // Retried on top of the server's version
    let report = coord.run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(coord.remote().stored(&id).unwrap().ver, 3);
    let record = coord.vault().store().get(local_id).unwrap();
    assert_eq!((record.status, record.version), (SecretStatus::Actual, 3));
}

#[tokio::test]
async fn edit_of_remotely_deleted_record_follows_policy() {
    for policy in [ConflictPolicy::RemoteWins, ConflictPolicy::KeepLocal] {
        let coord = fresh_coordinator(FakeRemote::default(), policy);
        let (local_id, id) = synced_note(&coord, "a").await;
        let seen = coord.vault().read(local_id).unwrap().last_modified;
        coord.vault().edit(local_id, seen, &note("a", "edited")).unwrap();
        coord.remote().soft_delete(&id);

        let report = coord.run().await.unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].kind, ConflictKind::RemoteDeleted);

        let record = coord.vault().store().get(local_id).unwrap();
        match policy {
            ConflictPolicy::RemoteWins => assert_eq!(record.status, SecretStatus::Deleted),
            ConflictPolicy::KeepLocal => {
                assert_eq!(record.status, SecretStatus::New);
                assert_eq!(record.secret_id, None);

                let report = coord.run().await.unwrap();
                assert_eq!(report.added, 1);
                let record = coord.vault().store().get(local_id).unwrap();
                assert_ne!(record.secret_id, Some(id));
            }
        }
    }
}

#[tokio::test]
async fn failing_record_leaves_others_intact() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    let (a, a_id) = synced_note(&coord, "a").await;
    let (b, _) = synced_note(&coord, "b").await;

    for local_id in [a, b] {
        let seen = coord.vault().read(local_id).unwrap().last_modified;
        coord.vault().edit(local_id, seen, &note("x", "edited")).unwrap();
    }
    coord.remote().fail_updates.lock().unwrap().insert(a_id);

    let report = coord.run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].local_id, Some(a));

    assert_eq!(coord.vault().store().get(a).unwrap().status, SecretStatus::Edited);
    assert_eq!(coord.vault().store().get(b).unwrap().status, SecretStatus::Actual);
}

#[tokio::test]
async fn timeout_is_a_per_record_failure() {
    let key = MasterKey::generate();
    let coord = coordinator(
        vault_with_key(&key),
        FakeRemote::default(),
        ConflictPolicy::RemoteWins,
    );
    let (local_id, id) = synced_note(&coord, "a").await;

    let (_, data) = vault_with_key(&key).seal_secret(&note("a", "newer")).unwrap();
    coord.remote().put(id, 2, data);
    coord.remote().hang_gets.store(true, Ordering::SeqCst);

    let report = coord.run().await.unwrap();
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].error, VaultError::from(RemoteError::Timeout).to_string());

    let record = coord.vault().store().get(local_id).unwrap();
    assert_eq!((record.status, record.version), (SecretStatus::Actual, 1));
}

#[tokio::test]
async fn auth_failure_aborts_pass() {
    let coord = fresh_coordinator(FakeRemote::default(), ConflictPolicy::RemoteWins);
    coord.vault().add(&note("a", "1")).unwrap();
    coord.vault().add(&note("b", "2")).unwrap();

    coord.remote().unauthorized.store(true, Ordering::SeqCst);
    let err = coord.run().await.unwrap_err();
    assert!(err.is_auth());

    // Manifest fetch failed first, so nothing else was attempted
    assert_eq!(coord.remote().calls(), vec!["version_list"]);
    assert!(coord
        .vault()
        .list()
        .unwrap()
        .iter()
        .all(|m| m.status == SecretStatus::New));
    assert!(coord.vault().store().metadata().unwrap().last_sync_at.is_none());
}

#[tokio::test]
async fn overlapping_pass_is_rejected() {
    let remote = FakeRemote {
        manifest_delay: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let coord = fresh_coordinator(remote, ConflictPolicy::RemoteWins);
    coord.vault().add(&note("a", "1")).unwrap();

    let (first, second) = tokio::join!(coord.run(), coord.run());
    assert_eq!(first.unwrap().added, 1);
    assert!(matches!(second, Err(VaultError::SyncInProgress)));

    // Once the first pass is done, a new one may start
    assert!(coord.run().await.is_ok());
}

#[tokio::test]
async fn cancellation_stops_between_records() {
    let cancel = SyncCancel::new();
    let remote = FakeRemote {
        cancel_after_add: Some(cancel.clone()),
        ..Default::default()
    };
    let coord = fresh_coordinator(remote, ConflictPolicy::RemoteWins);
    let first = coord.vault().add(&note("a", "1")).unwrap();
    let second = coord.vault().add(&note("b", "2")).unwrap();

    let report = coord.run_with_cancel(&cancel).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.added, 1);

    // The record in flight completed; the next one was never started
    assert_eq!(coord.vault().store().get(first).unwrap().status, SecretStatus::Actual);
    assert_eq!(coord.vault().store().get(second).unwrap().status, SecretStatus::New);
    assert_eq!(coord.remote().calls(), vec!["version_list", "add"]);
}

#[tokio::test]
async fn pull_of_record_deleted_after_manifest_is_skipped() {
    let key = MasterKey::generate();
    let coord = coordinator(
        vault_with_key(&key),
        FakeRemote::default(),
        ConflictPolicy::RemoteWins,
    );
    let (local_id, id) = synced_note(&coord, "a").await;

    // Edited elsewhere, then deleted before this device fetches it
    let (_, data) = vault_with_key(&key).seal_secret(&note("a", "v2")).unwrap();
    coord.remote().put(id, 2, data);
    coord.remote().delete_after_manifest.lock().unwrap().insert(id);

    let report = coord.run().await.unwrap();
    assert!(report.is_clean());
    assert_eq!(report.pulled, 0);
    let record = coord.vault().store().get(local_id).unwrap();
    assert_eq!((record.status, record.version), (SecretStatus::Actual, 1));

    // The next manifest no longer lists it
    let report = coord.run().await.unwrap();
    assert_eq!(report.remote_deleted, 1);
    assert_eq!(coord.vault().store().get(local_id).unwrap().status, SecretStatus::Deleted);
}

#[tokio::test]
async fn pass_is_rejected_while_another_handle_holds_the_lease() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vault.db");
    let key = MasterKey::generate();
    let coord = coordinator(
        Vault::new(LocalStore::open(&path).unwrap(), key),
        FakeRemote::default(),
        ConflictPolicy::RemoteWins,
    );
    coord.vault().add(&note("a", "1")).unwrap();

    // A second process opening the same vault file
    let other = LocalStore::open(&path).unwrap();
    let owner = Uuid::new_v4();
    let until = chrono::Utc::now().timestamp() + 60;
    assert!(other.acquire_sync_lease(&owner, until).unwrap());

    assert!(matches!(coord.run().await, Err(VaultError::SyncInProgress)));
    assert!(coord.remote().calls().is_empty());

    other.release_sync_lease(&owner).unwrap();
    assert_eq!(coord.run().await.unwrap().added, 1);

    // The finished pass gave the lease back
    assert!(other.acquire_sync_lease(&Uuid::new_v4(), until).unwrap());
}
