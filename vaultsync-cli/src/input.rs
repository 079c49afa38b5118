//! Building secret bodies from command-line flags.

use anyhow::{anyhow, bail, Result};
use clap::Args;
use std::path::PathBuf;
use vaultsync_core::{SecretBody, SecretKind};

/// Per-kind fields. Passwords and card codes are always prompted for.
#[derive(Args, Debug, Default, Clone)]
pub struct BodyArgs {
    /// Login name (auth)
    #[arg(long)]
    pub login: Option<String>,

    /// Prompt for a new password when editing (auth)
    #[arg(long)]
    pub new_password: bool,

    /// Cardholder name (card)
    #[arg(long)]
    pub cardholder: Option<String>,

    /// Card number (card)
    #[arg(long)]
    pub pan: Option<String>,

    /// Expiration month, 1-12 (card)
    #[arg(long)]
    pub exp_month: Option<u8>,

    /// Expiration year (card)
    #[arg(long)]
    pub exp_year: Option<u16>,

    /// Prompt for a new security code when editing (card)
    #[arg(long)]
    pub new_code: bool,

    /// Note text (text)
    #[arg(long)]
    pub text: Option<String>,

    /// File to store (binary)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// MIME type of the file (binary)
    #[arg(long)]
    pub content_type: Option<String>,
}

impl BodyArgs {
    /// Flags given that belong to a different kind.
    fn foreign_flags(&self, kind: SecretKind) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if kind != SecretKind::Auth {
            if self.login.is_some() {
                flags.push("--login");
            }
            if self.new_password {
                flags.push("--new-password");
            }
        }
        if kind != SecretKind::Card {
            if self.cardholder.is_some() {
                flags.push("--cardholder");
            }
            if self.pan.is_some() {
                flags.push("--pan");
            }
            if self.exp_month.is_some() {
                flags.push("--exp-month");
            }
            if self.exp_year.is_some() {
                flags.push("--exp-year");
            }
            if self.new_code {
                flags.push("--new-code");
            }
        }
        if kind != SecretKind::Text && self.text.is_some() {
            flags.push("--text");
        }
        if kind != SecretKind::Binary {
            if self.file.is_some() {
                flags.push("--file");
            }
            if self.content_type.is_some() {
                flags.push("--content-type");
            }
        }
        flags
    }

    fn check_kind(&self, kind: SecretKind) -> Result<()> {
        let foreign = self.foreign_flags(kind);
        if !foreign.is_empty() {
            bail!("{} not valid for a {} secret", foreign.join(", "), kind);
        }
        Ok(())
    }
}

/// Assemble a new body of `kind`. `prompt` reads a hidden value.
pub fn build_body(
    kind: SecretKind,
    args: &BodyArgs,
    prompt: &mut dyn FnMut(&str) -> Result<String>,
) -> Result<SecretBody> {
    args.check_kind(kind)?;

    let body = match kind {
        SecretKind::Auth => SecretBody::Auth {
            login: required(&args.login, "--login")?,
            password: prompt("Password: ")?,
        },
        SecretKind::Card => SecretBody::Card {
            cardholder: required(&args.cardholder, "--cardholder")?,
            pan: required(&args.pan, "--pan")?,
            expiration_month: check_month(required(&args.exp_month, "--exp-month")?)?,
            expiration_year: required(&args.exp_year, "--exp-year")?,
            code: prompt("Security code: ")?,
        },
        SecretKind::Text => SecretBody::Text {
            text: required(&args.text, "--text")?,
        },
        SecretKind::Binary => {
            let path = required(&args.file, "--file")?;
            let data = std::fs::read(&path)?;
            SecretBody::Binary {
                data,
                content_type: args
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                filename: file_name(&path),
            }
        }
    };
    Ok(body)
}

/// Apply the given flags to an existing body. The kind never changes here.
pub fn edit_body(
    body: &mut SecretBody,
    args: &BodyArgs,
    prompt: &mut dyn FnMut(&str) -> Result<String>,
) -> Result<()> {
    args.check_kind(body.kind())?;

    match body {
        SecretBody::Auth { login, password } => {
            if let Some(value) = &args.login {
                *login = value.clone();
            }
            if args.new_password {
                *password = prompt("New password: ")?;
            }
        }
        SecretBody::Card {
            cardholder,
            pan,
            expiration_month,
            expiration_year,
            code,
        } => {
            if let Some(value) = &args.cardholder {
                *cardholder = value.clone();
            }
            if let Some(value) = &args.pan {
                *pan = value.clone();
            }
            if let Some(value) = args.exp_month {
                *expiration_month = check_month(value)?;
            }
            if let Some(value) = args.exp_year {
                *expiration_year = value;
            }
            if args.new_code {
                *code = prompt("New security code: ")?;
            }
        }
        SecretBody::Text { text } => {
            if let Some(value) = &args.text {
                *text = value.clone();
            }
        }
        SecretBody::Binary {
            data,
            content_type,
            filename,
        } => {
            if let Some(path) = &args.file {
                *data = std::fs::read(path)?;
                *filename = file_name(path);
            }
            if let Some(value) = &args.content_type {
                *content_type = value.clone();
            }
        }
    }
    Ok(())
}

fn required<T: Clone>(value: &Option<T>, flag: &str) -> Result<T> {
    value.clone().ok_or_else(|| anyhow!("{} is required", flag))
}

fn check_month(month: u8) -> Result<u8> {
    if !(1..=12).contains(&month) {
        bail!("expiration month must be 1-12, got {}", month);
    }
    Ok(month)
}

fn file_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
