//! `credentials-tool` — CLI sub-commands over the credentials file:
//! `clear`, `remove <id>`, `set <id> password [<user>] <pass>`,
//! `set <id> pin <pin>`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use gw_core::prelude::*;
use gw_credentials::prelude::{FileCredentialsStorage, PasswordCredentials, PinCredentials};

#[derive(Parser, Debug)]
#[command(name = "credentials-tool", about = "Manage the gateway's encrypted credentials file")]
struct Args {
    #[arg(long, default_value = "credentials.conf")]
    path: PathBuf,

    #[arg(long, default_value = "credentials")]
    root: String,

    /// Hex-encoded AES-128 key used to encrypt/decrypt secret fields.
    #[arg(long)]
    key_hex: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Removes every stored credential.
    Clear,
    /// Removes the credential for one device.
    Remove { id: String },
    /// Sets a credential for one device.
    Set {
        id: String,
        #[command(subcommand)]
        kind: SetKind,
    },
}

#[derive(Subcommand, Debug)]
enum SetKind {
    /// `set <id> password [<user>] <pass>`; `user` defaults to empty.
    Password {
        #[arg(allow_hyphen_values = true)]
        user_or_pass: String,
        #[arg(allow_hyphen_values = true)]
        pass: Option<String>,
    },
    /// `set <id> pin <pin>`.
    Pin { pin: String },
}

fn parse_device_id(s: &str) -> anyhow::Result<DeviceId> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(hex, 16).map(DeviceId::from_raw).map_err(|_| anyhow::anyhow!("invalid device id: {s}"))
}

fn key(hex_str: &str) -> anyhow::Result<[u8; 16]> {
    let bytes = hex::decode(hex_str).context("key-hex is not valid hex")?;
    bytes.try_into().map_err(|_| anyhow::anyhow!("key-hex must decode to exactly 16 bytes"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let key = key(&args.key_hex)?;
    let storage = FileCredentialsStorage::new(&args.path, &args.root);
    storage.load();

    match args.command {
        Command::Clear => {
            storage.inner().clear();
            storage.save();
        }
        Command::Remove { id } => {
            let id = parse_device_id(&id)?;
            storage.inner().remove(id);
            storage.save();
        }
        Command::Set { id, kind } => {
            let id = parse_device_id(&id)?;
            match kind {
                SetKind::Password { user_or_pass, pass } => {
                    let (user, pass) = match pass {
                        Some(pass) => (user_or_pass, pass),
                        None => (String::new(), user_or_pass),
                    };
                    storage.inner().insert_or_update(id, Arc::new(PasswordCredentials::encrypt(&key, &user, &pass)));
                }
                SetKind::Pin { pin } => {
                    storage.inner().insert_or_update(id, Arc::new(PinCredentials::encrypt(&key, &pin)));
                }
            }
            storage.save();
        }
    }

    Ok(())
}
