//! clickmark-server configuration
//!
//! Resolved once at startup. Priority: command-line flag, environment
//! variable, config file, compiled default.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use clickmark_common::config::{FileConfig, ParticipantMode};
use clickmark_common::{Error, Result};
use rand::Rng;

use crate::session::DEFAULT_IDLE_TIMEOUT_SECS;

pub const DEFAULT_DATABASE: &str = "instance/app.db";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_BIND: &str = "127.0.0.1:5000";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Command-line arguments for clickmark-server
#[derive(Parser, Debug, Default)]
#[command(name = "clickmark-server")]
#[command(about = "Stimulus click-coordinate collection server")]
#[command(version)]
pub struct Args {
    /// TOML config file (default: <config dir>/clickmark/config.toml)
    #[arg(long, env = "CLICKMARK_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "CLICKMARK_DATABASE")]
    pub database: Option<PathBuf>,

    /// Key used to sign session cookies
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// Folder receiving uploaded stimuli
    #[arg(long, env = "UPLOAD_FOLDER")]
    pub upload_dir: Option<PathBuf>,

    /// Address to listen on
    #[arg(long, env = "CLICKMARK_BIND")]
    pub bind: Option<String>,

    /// Participant flow: "account" or "anonymous"
    #[arg(long, env = "PARTICIPANT_MODE")]
    pub mode: Option<ParticipantMode>,

    /// Maximum request body size for uploads
    #[arg(long, env = "MAX_UPLOAD_BYTES")]
    pub max_upload_bytes: Option<usize>,

    /// Seconds of inactivity after which a session is dropped
    #[arg(long, env = "SESSION_IDLE_SECS")]
    pub session_idle_secs: Option<u64>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_path: PathBuf,
    pub secret_key: String,
    /// True when no key was configured and one was generated for this process
    pub secret_generated: bool,
    pub upload_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub mode: ParticipantMode,
    pub max_upload_bytes: usize,
    pub session_idle_secs: u64,
}

impl ServerConfig {
    /// Load the config file named by `args` (or the default one) and resolve
    pub fn load(args: Args) -> Result<Self> {
        let file = FileConfig::load(args.config.as_deref())?;
        Self::resolve(args, file)
    }

    /// Merge arguments over file values over defaults
    pub fn resolve(args: Args, file: FileConfig) -> Result<Self> {
        let bind = args
            .bind
            .or(file.bind)
            .unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind_addr: SocketAddr = bind
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind, e)))?;

        let (secret_key, secret_generated) = match args.secret_key.or(file.secret_key) {
            Some(key) if !key.is_empty() => (key, false),
            _ => (generate_secret(), true),
        };

        let max_upload_bytes = args
            .max_upload_bytes
            .or(file.max_upload_bytes)
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        if max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be positive".to_string()));
        }

        let session_idle_secs = args
            .session_idle_secs
            .or(file.session_idle_secs)
            .unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS);
        if session_idle_secs == 0 || session_idle_secs > i64::MAX as u64 / 1000 {
            return Err(Error::Config(format!(
                "session_idle_secs out of range: {}",
                session_idle_secs
            )));
        }

        Ok(Self {
            database_path: args
                .database
                .or(file.database)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            secret_key,
            secret_generated,
            upload_dir: args
                .upload_dir
                .or(file.upload_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            bind_addr,
            mode: args.mode.or(file.mode).unwrap_or_default(),
            max_upload_bytes,
            session_idle_secs,
        })
    }
}

/// 32 random bytes as hex
fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
