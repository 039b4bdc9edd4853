//! Configuration file loading and shared configuration types
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Steps 1 and 2 belong to each binary's argument parser; this module covers
//! step 3 and provides the shared value types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

/// How participants enter the study
///
/// `Account` participants log in with their own identity and their
/// demographics row is stored as soon as the form is submitted.
/// `Anonymous` participants never log in; the demographics payload is kept
/// in the session and stored together with the recorded coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantMode {
    #[default]
    Account,
    Anonymous,
}

impl ParticipantMode {
    /// Route that renders and accepts the demographics form
    pub fn demographics_path(self) -> &'static str {
        match self {
            ParticipantMode::Account => "/demographics",
            ParticipantMode::Anonymous => "/",
        }
    }

    /// Where a request without a session is sent
    pub fn entry_path(self) -> &'static str {
        match self {
            ParticipantMode::Account => "/login",
            ParticipantMode::Anonymous => "/",
        }
    }
}

impl fmt::Display for ParticipantMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantMode::Account => write!(f, "account"),
            ParticipantMode::Anonymous => write!(f, "anonymous"),
        }
    }
}

impl FromStr for ParticipantMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "account" => Ok(ParticipantMode::Account),
            "anonymous" => Ok(ParticipantMode::Anonymous),
            other => Err(format!(
                "unknown participant mode '{}' (expected 'account' or 'anonymous')",
                other
            )),
        }
    }
}

/// Contents of `config.toml`
///
/// Every key is optional; missing keys fall through to compiled defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub secret_key: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub mode: Option<ParticipantMode>,
    pub max_upload_bytes: Option<usize>,
    pub session_idle_secs: Option<u64>,
    pub export_dir: Option<PathBuf>,
}

impl FileConfig {
    /// Load the config file
    ///
    /// An explicitly requested file must exist and parse. Without an explicit
    /// path the platform default locations are tried, and a missing file
    /// yields an empty config rather than an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        match default_config_path() {
            Some(path) => match Self::from_file(&path) {
                Ok(config) => Ok(config),
                Err(e) => {
                    warn!("Ignoring config file {}: {}", path.display(), e);
                    Ok(Self::default())
                }
            },
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Parse a specific TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }
}

/// First existing default config location
///
/// `<config_dir>/clickmark/config.toml`, then `/etc/clickmark/config.toml`
/// on Linux.
fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("clickmark").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/clickmark/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}
