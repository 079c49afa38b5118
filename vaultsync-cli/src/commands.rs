//! Subcommand implementations.

use anyhow::{anyhow, bail, Context as _, Result};
use std::path::PathBuf;
use vaultsync_core::sync::models::AuthRequest;
use vaultsync_core::{
    get_default_config_path, ConflictPolicy, DeleteOutcome, LocalStore, MasterKey, Secret,
    SecretBody, SecretKind, SyncClient, SyncCoordinator, SyncReport, Vault, VaultError,
};

use crate::config::ClientConfig;
use crate::input::{build_body, edit_body, BodyArgs};

pub struct Context {
    config: ClientConfig,
    config_path: PathBuf,
}

impl Context {
    pub fn load(config_path: Option<PathBuf>, vault: Option<PathBuf>) -> Result<Self> {
        let config_path = config_path.unwrap_or_else(get_default_config_path);
        let mut config = ClientConfig::load_or_default(&config_path)?;
        if vault.is_some() {
            config.vault_path = vault;
        }
        Ok(Self {
            config,
            config_path,
        })
    }

    pub fn init(mut self, login: &str, server: Option<String>) -> Result<()> {
        let path = self.config.vault_path();
        if path.exists() {
            bail!("A vault already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if let Some(server) = server {
            self.config.server_url = server;
        }

        let password = rpassword::prompt_password("Choose master password: ")?;
        let confirm = rpassword::prompt_password("Confirm master password: ")?;
        if password != confirm {
            bail!("Passwords do not match");
        }

        let store = LocalStore::open(&path)?;
        let mut metadata = store.metadata()?;
        metadata.login = Some(login.to_string());
        metadata.server_url = Some(self.config.server_url.clone());
        store.save_metadata(&metadata)?;

        Vault::unlock(store, MasterKey::derive(&password, login)?)?;
        self.config.vault_path = Some(path.clone());
        self.config.save(&self.config_path)?;

        println!("Vault created at {}", path.display());
        println!("Device id: {}", metadata.device_id);
        Ok(())
    }

    /// Register or log in, storing the session token in the vault.
    pub async fn authenticate(&self, register: bool) -> Result<()> {
        let vault = self.unlock()?;
        let store = vault.store();
        let mut metadata = store.metadata()?;
        let login = metadata
            .login
            .clone()
            .ok_or_else(|| anyhow!("Vault has no login; run init first"))?;
        let server_url = metadata
            .server_url
            .clone()
            .unwrap_or_else(|| self.config.server_url.clone());

        let password = rpassword::prompt_password("Account password: ")?;
        let request = AuthRequest {
            login,
            password,
            master_hash: vault.key().auth_hash(),
            device_id: metadata.device_id,
        };

        let mut client = SyncClient::new(&server_url, self.config.request_timeout())?;
        let token = if register {
            client.register(&request).await?
        } else {
            client.login(&request).await?
        };

        metadata.server_url = Some(server_url.clone());
        metadata.token = Some(token);
        store.save_metadata(&metadata)?;

        println!(
            "{} as {} on {}",
            if register { "Registered" } else { "Logged in" },
            request.login,
            server_url
        );
        Ok(())
    }

    pub fn add(
        &self,
        kind: SecretKind,
        title: String,
        description: String,
        fields: &BodyArgs,
    ) -> Result<()> {
        let vault = self.unlock()?;
        let body = build_body(kind, fields, &mut prompt)?;
        let local_id = vault.add(&Secret::new(title, description, body))?;
        println!("Added secret {}", local_id);
        Ok(())
    }

    pub fn list(&self) -> Result<()> {
        let store = self.open_store()?;
        let metas = store.list_meta()?;
        if metas.is_empty() {
            println!("No secrets");
            return Ok(());
        }

        println!("{:>5}  {:<7}  {:<7}  {:<32}  REMOTE", "ID", "TYPE", "STATUS", "TITLE");
        for meta in metas {
            let kind = SecretKind::from_type_id(meta.type_id)
                .map(|k| k.to_string())
                .unwrap_or_else(|| format!("#{}", meta.type_id));
            let remote = meta
                .secret_id
                .map(|id| format!("{} v{}", id, meta.version))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "{:>5}  {:<7}  {:<7}  {:<32}  {}",
                meta.local_id, kind, meta.status, meta.title, remote
            );
        }
        Ok(())
    }

    pub fn show(&self, local_id: i64, output: Option<PathBuf>) -> Result<()> {
        let vault = self.unlock()?;
        let item = vault.read(local_id).map_err(not_found(local_id))?;
        let secret = item.secret;

        println!("Title:       {}", secret.title);
        if !secret.description.is_empty() {
            println!("Description: {}", secret.description);
        }
        println!("Status:      {}", item.status);
        match &secret.body {
            SecretBody::Auth { login, password } => {
                println!("Login:       {}", login);
                println!("Password:    {}", password);
            }
            SecretBody::Card {
                cardholder,
                pan,
                expiration_month,
                expiration_year,
                code,
            } => {
                println!("Cardholder:  {}", cardholder);
                println!("Number:      {}", pan);
                println!("Expires:     {:02}/{}", expiration_month, expiration_year);
                println!("Code:        {}", code);
            }
            SecretBody::Text { text } => println!("\n{}", text),
            SecretBody::Binary {
                data,
                content_type,
                filename,
            } => {
                println!("File:        {} ({}, {} bytes)", filename, content_type, data.len());
                if let Some(path) = output {
                    std::fs::write(&path, data)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Written to {}", path.display());
                }
            }
        }
        Ok(())
    }

    pub fn edit(
        &self,
        local_id: i64,
        title: Option<String>,
        description: Option<String>,
        fields: &BodyArgs,
    ) -> Result<()> {
        let vault = self.unlock()?;
        let item = vault.read(local_id).map_err(not_found(local_id))?;

        let mut secret = item.secret;
        if let Some(title) = title {
            secret.title = title;
        }
        if let Some(description) = description {
            secret.description = description;
        }
        edit_body(&mut secret.body, fields, &mut prompt)?;

        match vault.edit(local_id, item.last_modified, &secret) {
            Ok(_) => {
                println!("Updated secret {}", local_id);
                Ok(())
            }
            Err(e) if e.is_stale_write() => {
                bail!("Secret {} changed while editing; try again", local_id)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete(&self, local_id: i64) -> Result<()> {
        let store = self.open_store()?;
        match store.soft_delete(local_id) {
            Ok(DeleteOutcome::Removed) => println!("Deleted secret {}", local_id),
            Ok(DeleteOutcome::MarkedDeleted) => {
                println!("Secret {} will be deleted on the next sync", local_id)
            }
            Err(e) if e.is_not_found() => bail!("No secret with id {}", local_id),
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn sync(&self, policy: Option<ConflictPolicy>) -> Result<()> {
        let vault = self.unlock()?;
        let metadata = vault.store().metadata()?;
        let token = metadata
            .token
            .clone()
            .ok_or_else(|| anyhow!("Not logged in; run login first"))?;
        let server_url = metadata
            .server_url
            .clone()
            .unwrap_or_else(|| self.config.server_url.clone());

        let mut options = self.config.sync_options();
        if let Some(policy) = policy {
            options.conflict_policy = policy;
        }

        let client = SyncClient::new(&server_url, options.request_timeout)?.with_token(token);
        let coordinator = SyncCoordinator::new(vault, client, options);

        match coordinator.run().await {
            Ok(report) => {
                print_report(&report);
                Ok(())
            }
            Err(e) if e.is_auth() => bail!("Session rejected by the server; run login again"),
            Err(VaultError::SyncInProgress) => bail!("Another sync is already running"),
            Err(e) => Err(e.into()),
        }
    }

    fn open_store(&self) -> Result<LocalStore> {
        let path = self.config.vault_path();
        if !path.exists() {
            bail!("No vault at {}; run init first", path.display());
        }
        Ok(LocalStore::open(&path)?)
    }

    fn unlock(&self) -> Result<Vault> {
        let store = self.open_store()?;
        let login = store
            .metadata()?
            .login
            .ok_or_else(|| anyhow!("Vault has no login; run init first"))?;

        let password = rpassword::prompt_password("Master password: ")?;
        let key = MasterKey::derive(&password, &login)?;
        match Vault::unlock(store, key) {
            Ok(vault) => Ok(vault),
            Err(e) if e.is_decode() => bail!("Wrong master password"),
            Err(e) => Err(e.into()),
        }
    }
}

fn prompt(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(label)?)
}

fn not_found(local_id: i64) -> impl Fn(VaultError) -> anyhow::Error {
    move |e| {
        if e.is_not_found() {
            anyhow!("No secret with id {}", local_id)
        } else if e.is_decode() {
            anyhow!("Secret {} could not be decrypted: {}", local_id, e)
        } else {
            e.into()
        }
    }
}

fn print_report(report: &SyncReport) {
    println!(
        "Sync complete: {} added, {} updated, {} deleted, {} pulled, {} removed remotely",
        report.added, report.updated, report.deleted, report.pulled, report.remote_deleted
    );
    for conflict in &report.conflicts {
        println!(
            "  conflict on {} ({:?}): {:?}",
            conflict.local_id, conflict.kind, conflict.resolution
        );
    }
    for failure in &report.failures {
        let id = failure
            .local_id
            .map(|id| id.to_string())
            .or_else(|| failure.secret_id.map(|id| id.to_string()))
            .unwrap_or_default();
        println!("  failed {}: {}", id, failure.error);
    }
    if report.cancelled {
        println!("  (cancelled)");
    }
}
