//! Sync coordinator: reconciles the local vault against the server manifest.
//!
//! One pass fetches the manifest, walks local records in `local_id` order
//! pushing or pulling each one, then pulls manifest ids that have no local
//! record. Every record is handled on its own: a failure is recorded in the
//! report and leaves that record's status untouched for the next pass.

#[cfg(test)]
mod tests;

use crate::store::{LocalStore, SecretMeta, SecretRecord, SecretStatus};
use crate::sync::conflict::{ConflictKind, Resolution};
use crate::sync::models::{RemoteSecret, VersionList};
use crate::sync::remote::{RemoteError, RemoteResult, SecretRemote};
use crate::sync::SyncOptions;
use crate::vault::Vault;
use crate::{Result, VaultError};
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Cooperative cancellation flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct SyncCancel(Arc<AtomicBool>);

impl SyncCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncConflict {
    pub local_id: i64,
    pub secret_id: Uuid,
    pub kind: ConflictKind,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub local_id: Option<i64>,
    pub secret_id: Option<Uuid>,
    pub error: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// NEW records pushed.
    pub added: usize,
    /// EDITED records pushed.
    pub updated: usize,
    /// Deletes pushed and purged locally.
    pub deleted: usize,
    /// Records fetched from the server, new or newer.
    pub pulled: usize,
    /// Local records marked DELETED because the server dropped them.
    pub remote_deleted: usize,
    pub conflicts: Vec<SyncConflict>,
    pub failures: Vec<SyncFailure>,
    pub cancelled: bool,
}

impl SyncReport {
    pub fn changes(&self) -> usize {
        self.added + self.updated + self.deleted + self.pulled + self.remote_deleted
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// How long a pass may go without renewing its lease before another
/// process is allowed to take over.
const SYNC_LEASE_SECS: i64 = 300;

/// Database-backed half of single-flight, released on drop.
///
/// The in-process mutex only covers clones of one `LocalStore`; the lease
/// row also covers other handles and processes opening the same file.
struct SyncLease<'a> {
    store: &'a LocalStore,
    owner: Uuid,
}

impl<'a> SyncLease<'a> {
    fn acquire(store: &'a LocalStore) -> Result<Self> {
        let owner = Uuid::new_v4();
        if !store.acquire_sync_lease(&owner, lease_deadline())? {
            return Err(VaultError::SyncInProgress);
        }
        Ok(Self { store, owner })
    }

    fn renew(&self) -> Result<()> {
        if !self.store.acquire_sync_lease(&self.owner, lease_deadline())? {
            tracing::warn!("Sync lease was taken over by another pass");
            return Err(VaultError::SyncInProgress);
        }
        Ok(())
    }
}

impl Drop for SyncLease<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.store.release_sync_lease(&self.owner) {
            tracing::warn!("Failed to release sync lease: {}", e);
        }
    }
}

fn lease_deadline() -> i64 {
    chrono::Utc::now().timestamp() + SYNC_LEASE_SECS
}

/// Drives sync passes for one vault against one remote.
pub struct SyncCoordinator<R> {
    vault: Vault,
    remote: R,
    options: SyncOptions,
}

impl<R: SecretRemote> SyncCoordinator<R> {
    pub fn new(vault: Vault, remote: R, options: SyncOptions) -> Self {
        Self {
            vault,
            remote,
            options,
        }
    }

    pub fn vault(&self) -> &Vault {
        &self.vault
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one pass to completion.
    pub async fn run(&self) -> Result<SyncReport> {
        self.run_with_cancel(&SyncCancel::new()).await
    }

    /// Run one pass, stopping between records once `cancel` is set.
    ///
    /// Fails fast with [`VaultError::SyncInProgress`] if a pass over the
    /// same vault is already running, in this process or another one. A manifest failure or an
    /// authentication failure aborts the pass.
    pub async fn run_with_cancel(&self, cancel: &SyncCancel) -> Result<SyncReport> {
        let store = self.vault.store();
        let _running = store
            .sync_lock()
            .try_lock()
            .map_err(|_| VaultError::SyncInProgress)?;
        let lease = SyncLease::acquire(store)?;

        let manifest = self.call(self.remote.version_list()).await?;
        tracing::info!("Sync pass started: {} remote secrets", manifest.len());

        let mut report = SyncReport::default();
        let locals = store.list_meta()?;
        let known: HashSet<Uuid> = locals.iter().filter_map(|m| m.secret_id).collect();

        for meta in &locals {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            lease.renew()?;
            if let Err(e) = self.sync_record(meta, &manifest, &mut report).await {
                if e.is_auth() {
                    tracing::warn!("Sync aborted: {}", e);
                    return Err(e);
                }
                tracing::warn!("Sync of secret {} failed: {}", meta.local_id, e);
                report.failures.push(SyncFailure {
                    local_id: Some(meta.local_id),
                    secret_id: meta.secret_id,
                    error: e.to_string(),
                });
            }
        }

        if !report.cancelled {
            for (&id, &version) in manifest.iter().filter(|(id, _)| !known.contains(id)) {
                if cancel.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                lease.renew()?;
                if let Err(e) = self.pull_new(id, version, &mut report).await {
                    if e.is_auth() {
                        tracing::warn!("Sync aborted: {}", e);
                        return Err(e);
                    }
                    tracing::warn!("Pull of remote secret {} failed: {}", id, e);
                    report.failures.push(SyncFailure {
                        local_id: None,
                        secret_id: Some(id),
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut metadata = store.metadata()?;
        metadata.last_sync_at = Some(chrono::Utc::now().timestamp());
        store.save_metadata(&metadata)?;

        tracing::info!(
            "Sync pass finished: {} changes, {} conflicts, {} failures{}",
            report.changes(),
            report.conflicts.len(),
            report.failures.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    async fn sync_record(
        &self,
        meta: &SecretMeta,
        manifest: &VersionList,
        report: &mut SyncReport,
    ) -> Result<()> {
        match (meta.status, meta.secret_id) {
            (SecretStatus::New | SecretStatus::Edited, None) => {
                self.push_new(meta.local_id, report).await
            }
            (SecretStatus::New | SecretStatus::Edited, Some(id)) => {
                self.push_update(meta.local_id, id, manifest, report).await
            }
            (SecretStatus::Deleted, Some(id)) => self.push_delete(meta.local_id, id, report).await,
            (SecretStatus::Deleted, None) => {
                self.vault.store().purge(meta.local_id)?;
                Ok(())
            }
            (SecretStatus::Actual, Some(id)) => self.refresh(meta, id, manifest, report).await,
            (SecretStatus::Actual, None) => {
                tracing::warn!("Secret {} is actual but has no remote id", meta.local_id);
                Ok(())
            }
        }
    }

    /// NEW → Add → ACTUAL.
    async fn push_new(&self, local_id: i64, report: &mut SyncReport) -> Result<()> {
        let Some(record) = self.current(local_id)? else {
            return Ok(());
        };

        let pushed = self
            .call(self.remote.add(record.version, &record.ciphertext))
            .await?;

        match self
            .vault
            .store()
            .mark_pushed(local_id, record.last_modified, &pushed.id, pushed.ver)?
        {
            Some(_) => {
                tracing::debug!("Added secret {} as {}", local_id, pushed.id);
                report.added += 1;
            }
            None => {
                // Deleted locally while the Add was in flight
                tracing::debug!("Secret {} vanished during push, deleting {}", local_id, pushed.id);
                if let Err(e) = self.call(self.remote.delete(pushed.id)).await {
                    tracing::warn!("Cleanup delete of {} failed: {}", pushed.id, e);
                }
            }
        }
        Ok(())
    }

    /// EDITED → Update → ACTUAL, or a conflict.
    async fn push_update(
        &self,
        local_id: i64,
        id: Uuid,
        manifest: &VersionList,
        report: &mut SyncReport,
    ) -> Result<()> {
        let Some(record) = self.current(local_id)? else {
            return Ok(());
        };

        if !manifest.contains_key(&id) {
            return self.resolve_remote_deleted(&record, id, report);
        }

        match self
            .call(self.remote.update(id, record.version, &record.ciphertext))
            .await
        {
            Ok(pushed) => {
                self.vault
                    .store()
                    .mark_pushed(local_id, record.last_modified, &pushed.id, pushed.ver)?;
                tracing::debug!("Updated secret {} to version {}", local_id, pushed.ver);
                report.updated += 1;
                Ok(())
            }
            Err(RemoteError::VersionTooLow) => self.resolve_stale(&record, id, report).await,
            Err(RemoteError::NotFound | RemoteError::ItemIsDeleted) => {
                self.resolve_remote_deleted(&record, id, report)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// DELETED → Delete → purged.
    async fn push_delete(&self, local_id: i64, id: Uuid, report: &mut SyncReport) -> Result<()> {
        match self.call(self.remote.delete(id)).await {
            Ok(()) | Err(RemoteError::NotFound) => {
                self.vault.store().purge(local_id)?;
                tracing::debug!("Deleted secret {} ({})", local_id, id);
                report.deleted += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// ACTUAL: pull if the server is ahead, mark deleted if it dropped the record.
    async fn refresh(
        &self,
        meta: &SecretMeta,
        id: Uuid,
        manifest: &VersionList,
        report: &mut SyncReport,
    ) -> Result<()> {
        match manifest.get(&id) {
            None => {
                if self
                    .vault
                    .store()
                    .mark_remote_deleted(meta.local_id, meta.last_modified)?
                {
                    tracing::debug!("Secret {} was deleted remotely", meta.local_id);
                    report.remote_deleted += 1;
                }
                Ok(())
            }
            Some(&remote_version) if remote_version > meta.version => {
                let remote = match self.call(self.remote.get(id)).await {
                    Ok(remote) => remote,
                    // Deleted since the manifest was fetched; the next pass marks it
                    Err(RemoteError::NotFound) => {
                        tracing::debug!("Secret {} vanished before it could be pulled", id);
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                };
                if self.apply_remote(&remote, Some(meta.last_modified))? {
                    report.pulled += 1;
                }
                Ok(())
            }
            Some(&remote_version) if remote_version < meta.version => {
                tracing::warn!(
                    "Secret {} is at version {} locally but {} remotely",
                    meta.local_id,
                    meta.version,
                    remote_version
                );
                Ok(())
            }
            Some(_) => Ok(()),
        }
    }

    /// A manifest id with no local record: another device created it.
    async fn pull_new(&self, id: Uuid, version: i64, report: &mut SyncReport) -> Result<()> {
        let remote = match self.call(self.remote.get(id)).await {
            Ok(remote) => remote,
            // Deleted since the manifest was fetched
            Err(RemoteError::NotFound) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if remote.ver != version {
            tracing::debug!("Secret {} moved from version {} to {}", id, version, remote.ver);
        }
        if self.apply_remote(&remote, None)? {
            report.pulled += 1;
        }
        Ok(())
    }

    async fn resolve_stale(
        &self,
        record: &SecretRecord,
        id: Uuid,
        report: &mut SyncReport,
    ) -> Result<()> {
        let remote = match self.call(self.remote.get(id)).await {
            Ok(remote) => remote,
            Err(RemoteError::NotFound) => return self.resolve_remote_deleted(record, id, report),
            Err(e) => return Err(e.into()),
        };

        let resolution = self.options.conflict_policy.resolve(ConflictKind::StaleVersion);
        let applied = match resolution {
            Resolution::AcceptRemote => self.apply_remote(&remote, Some(record.last_modified))?,
            Resolution::KeepLocal => {
                self.vault
                    .store()
                    .rebase(record.local_id, record.last_modified, remote.ver)?
            }
        };

        if applied {
            tracing::info!(
                "Conflict on secret {}: server at version {}, {:?}",
                record.local_id,
                remote.ver,
                resolution
            );
            report.conflicts.push(SyncConflict {
                local_id: record.local_id,
                secret_id: id,
                kind: ConflictKind::StaleVersion,
                resolution,
            });
        }
        Ok(())
    }

    fn resolve_remote_deleted(
        &self,
        record: &SecretRecord,
        id: Uuid,
        report: &mut SyncReport,
    ) -> Result<()> {
        let store = self.vault.store();
        let resolution = self.options.conflict_policy.resolve(ConflictKind::RemoteDeleted);
        let applied = match resolution {
            Resolution::AcceptRemote => {
                store.mark_remote_deleted(record.local_id, record.last_modified)?
            }
            Resolution::KeepLocal => store.detach(record.local_id, record.last_modified)?,
        };

        if applied {
            tracing::info!(
                "Secret {} was edited locally but deleted remotely, {:?}",
                record.local_id,
                resolution
            );
            report.conflicts.push(SyncConflict {
                local_id: record.local_id,
                secret_id: id,
                kind: ConflictKind::RemoteDeleted,
                resolution,
            });
        }
        Ok(())
    }

    /// Decode a pulled secret for its header and store it as ACTUAL.
    fn apply_remote(
        &self,
        remote: &RemoteSecret,
        expected_last_modified: Option<i64>,
    ) -> Result<bool> {
        let secret = self.vault.open_secret(&remote.data)?;
        let local_id = self.vault.store().upsert_remote(
            &remote.id,
            remote.ver,
            &secret.header(),
            &remote.data,
            expected_last_modified,
        )?;

        match local_id {
            Some(local_id) => {
                tracing::debug!("Pulled {} v{} into secret {}", remote.id, remote.ver, local_id);
                Ok(true)
            }
            None => {
                tracing::debug!("Skipped pull of {}: edited locally meanwhile", remote.id);
                Ok(false)
            }
        }
    }

    fn current(&self, local_id: i64) -> Result<Option<SecretRecord>> {
        match self.vault.store().get(local_id) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = RemoteResult<T>>) -> RemoteResult<T> {
        tokio::time::timeout(self.options.request_timeout, fut)
            .await
            .map_err(|_| RemoteError::Timeout)?
    }
}
