mod commands;
mod config;
mod input;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use vaultsync_core::{ConflictPolicy, SecretKind};

use crate::input::BodyArgs;

/// VaultSync CLI - encrypted secret vault with server sync
#[derive(Parser)]
#[command(name = "vaultsync")]
#[command(about = "Encrypted secret vault with server sync", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "VAULTSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Vault database override
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a vault and write the client config
    Init {
        /// Account login; also salts the master key
        #[arg(long)]
        login: String,

        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },

    /// Create the server account for this vault
    Register,

    /// Sign in to the server account for this vault
    Login,

    /// Add a secret
    Add {
        /// card, auth, text or binary
        #[arg(long = "type")]
        kind: SecretKind,

        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[command(flatten)]
        fields: BodyArgs,
    },

    /// List secrets without decrypting them
    List,

    /// Decrypt and print a secret
    Show {
        id: i64,

        /// Write binary content to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Change fields of a secret
    Edit {
        id: i64,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[command(flatten)]
        fields: BodyArgs,
    },

    /// Delete a secret
    Delete { id: i64 },

    /// Synchronize with the server
    Sync {
        /// Conflict policy override: remote-wins or keep-local
        #[arg(long)]
        policy: Option<ConflictPolicy>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let ctx = commands::Context::load(cli.config, cli.vault)?;

    match cli.command {
        Commands::Init { login, server } => ctx.init(&login, server),
        Commands::Register => ctx.authenticate(true).await,
        Commands::Login => ctx.authenticate(false).await,
        Commands::Add {
            kind,
            title,
            description,
            fields,
        } => ctx.add(kind, title, description, &fields),
        Commands::List => ctx.list(),
        Commands::Show { id, output } => ctx.show(id, output),
        Commands::Edit {
            id,
            title,
            description,
            fields,
        } => ctx.edit(id, title, description, &fields),
        Commands::Delete { id } => ctx.delete(id),
        Commands::Sync { policy } => ctx.sync(policy).await,
    }
}
