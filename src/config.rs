//! CLI flags and the layered configuration they resolve to.
//!
//! Precedence, lowest to highest: built-in defaults, environment variables
//! (`OZB_*`, plus the `VAULT_ADDR`/`VAULT_TOKEN` passthrough), CLI flags —
//! `clap`'s derive API with `env` fallbacks gives us that layering for
//! free on every field; `Config::from_cli` only resolves the handful of
//! settings (passphrase requirement, scratch directory, algorithm names)
//! that need validation or a non-trivial default.

use crate::crypto::{self, Authentication, Encryption};
use crate::error::Error;
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

#[derive(Parser, Debug, Clone)]
#[command(name = "ozb", about = "Offsite incremental backups of copy-on-write snapshots")]
pub struct Cli {
    /// Upload the named local snapshot as a new backup.
    #[arg(long)]
    pub upload: Option<String>,
    /// Download and restore the backup with this uuid.
    #[arg(long)]
    pub download: Option<Uuid>,
    /// Take a fresh local snapshot with this backend (`btrfs`|`zfs`) and upload it.
    #[arg(long)]
    pub backup: Option<String>,
    /// Restore target backend (`btrfs`|`zfs`|`discard`).
    #[arg(long)]
    pub restore: Option<String>,
    /// List backups reachable under `--folder`/`--subvolume`.
    #[arg(long)]
    pub list: bool,
    /// Print the reachable chain for `--subvolume`.
    #[arg(long)]
    pub chain: bool,
    /// Query the object-store backend's quota.
    #[arg(long)]
    pub quota: bool,
    /// Print the current latest pointer for `--subvolume`.
    #[arg(long)]
    pub latest: bool,
    /// Garbage-collect objects unreachable from the latest pointer.
    #[arg(long)]
    pub cleanup: bool,

    #[arg(long, env = "OZB_FOLDER")]
    pub folder: String,
    #[arg(long, env = "OZB_SUBVOLUME")]
    pub subvolume: String,
    #[arg(long, env = "OZB_RESTORE_TARGET")]
    pub restoretarget: Option<String>,
    #[arg(long, env = "OZB_PASSPHRASE")]
    pub passphrase: Option<String>,
    #[arg(long, env = "OZB_ENCRYPTION", default_value = "none")]
    pub encryption: String,
    #[arg(long, env = "OZB_AUTHENTICATION", default_value = "none")]
    pub authentication: String,
    #[arg(long, env = "OZB_CHUNKSIZE", default_value_t = 64)]
    pub chunksize: u64,
    #[arg(long, env = "OZB_TMPDIR")]
    pub tmpdir: Option<PathBuf>,
    /// Force a full backup even if a parent chain exists.
    #[arg(long)]
    pub full: bool,
    /// Retry backoff scale factor; base delay is `5s * ratio`.
    #[arg(long, env = "OZB_RATIO", default_value_t = 1.0)]
    pub ratio: f64,
    #[arg(long, env = "VAULT_ADDR")]
    pub vault: Option<String>,
    #[arg(long, env = "VAULT_TOKEN")]
    pub vaulttoken: Option<String>,
    /// Root directory for the filesystem-backed object store.
    #[arg(long, env = "OZB_STORE_ROOT", default_value = "./ozb-store")]
    pub store_root: PathBuf,
}

/// The resolved, validated configuration every subsystem is built from.
#[derive(Debug, Clone)]
pub struct Config {
    pub folder: String,
    pub subvolume: String,
    pub restore_target: Option<String>,
    pub passphrase: Option<String>,
    pub encryption: Encryption,
    pub authentication: Authentication,
    pub chunk_size_mib: u64,
    pub tmp_dir: PathBuf,
    pub full: bool,
    pub retry_ratio: f64,
    pub vault_addr: Option<String>,
    pub vault_token: Option<String>,
    pub store_root: PathBuf,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self, Error> {
        if dotenvy::dotenv().is_ok() {
            debug!("loaded .env file");
        }

        let encryption = Encryption::parse(&cli.encryption)?;
        let authentication = Authentication::parse(&cli.authentication)?;
        crypto::require_passphrase_if_needed(encryption, authentication, &cli.passphrase)?;

        Ok(Config {
            folder: cli.folder.clone(),
            subvolume: cli.subvolume.clone(),
            restore_target: cli.restoretarget.clone(),
            passphrase: cli.passphrase.clone(),
            encryption,
            authentication,
            chunk_size_mib: cli.chunksize.max(1),
            tmp_dir: cli.tmpdir.clone().unwrap_or_else(default_tmp_dir),
            full: cli.full,
            retry_ratio: cli.ratio,
            vault_addr: cli.vault.clone(),
            vault_token: cli.vaulttoken.clone(),
            store_root: cli.store_root.clone(),
        })
    }
}

/// `/dev/shm` if present, else the platform temp directory (§6).
fn default_tmp_dir() -> PathBuf {
    let shm = PathBuf::from("/dev/shm");
    if shm.is_dir() {
        shm
    } else {
        std::env::temp_dir()
    }
}
