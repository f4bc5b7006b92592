use crate::error::TransferError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Endpoint and credentials for one S3-compatible gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Endpoint as `host:port` (e.g. `ceph1:7480`)
    pub host: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,
}

impl Profile {
    pub fn new(host: impl Into<String>, access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            access_key: access_key.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Check the profile before any request is made: the host must resolve
    /// and both credentials must be present.
    pub async fn validate(&self) -> std::result::Result<(), TransferError> {
        let resolvable = match tokio::net::lookup_host(self.host.as_str()).await {
            Ok(mut addrs) => addrs.next().is_some(),
            Err(_) => false,
        };
        if !resolvable {
            return Err(TransferError::Validation(format!("invalid host '{}'", self.host)));
        }
        if self.access_key.is_empty() {
            return Err(TransferError::Validation("empty access key".to_string()));
        }
        if self.secret_key.is_empty() {
            return Err(TransferError::Validation("empty secret key".to_string()));
        }
        Ok(())
    }
}

/// Timing and framing knobs of the transfer engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// TCP dial timeout in milliseconds
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Read deadline of one response read attempt in milliseconds
    #[serde(default = "default_read_deadline_ms")]
    pub read_deadline_ms: u64,

    /// Write deadline of one body chunk in milliseconds
    #[serde(default = "default_write_deadline_ms")]
    pub write_deadline_ms: u64,

    /// How long to wait for a response once the body is written, in milliseconds
    #[serde(default = "default_final_wait_ms")]
    pub final_wait_ms: u64,

    /// Minimum spacing of progress updates in milliseconds
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,

    /// Upload body chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_deadline_ms() -> u64 {
    1_000
}

fn default_write_deadline_ms() -> u64 {
    5_000
}

fn default_final_wait_ms() -> u64 {
    5_000
}

fn default_progress_interval_ms() -> u64 {
    1_000
}

fn default_chunk_size() -> usize {
    8 * 1024
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_deadline_ms: default_read_deadline_ms(),
            write_deadline_ms: default_write_deadline_ms(),
            final_wait_ms: default_final_wait_ms(),
            progress_interval_ms: default_progress_interval_ms(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_deadline(&self) -> Duration {
        Duration::from_millis(self.read_deadline_ms)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }

    pub fn final_wait(&self) -> Duration {
        Duration::from_millis(self.final_wait_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.max(1)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Named endpoint profiles
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,

    /// Profile used when none is named
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    /// Engine timing
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    pub fn new() -> Self {
        Self {
            profiles: HashMap::new(),
            default_profile: None,
            transfer: TransferConfig::default(),
        }
    }

    /// Get a profile by name, or the default profile if not specified
    pub fn get_profile(&self, name: Option<&str>) -> Option<&Profile> {
        if let Some(name) = name {
            self.profiles.get(name)
        } else if let Some(default) = &self.default_profile {
            self.profiles.get(default)
        } else {
            self.profiles.values().next()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - S3XFER_HOST (`host:port`)
/// - S3XFER_ACCESS_KEY / AWS_ACCESS_KEY_ID
/// - S3XFER_SECRET_KEY / AWS_SECRET_ACCESS_KEY
/// - S3XFER_FINAL_WAIT_MS, S3XFER_READ_DEADLINE_MS, S3XFER_WRITE_DEADLINE_MS (optional)
pub fn load_from_env() -> Result<Config> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let host = std::env::var("S3XFER_HOST").context("S3XFER_HOST environment variable not set")?;

    let access_key = std::env::var("S3XFER_ACCESS_KEY")
        .or_else(|_| std::env::var("AWS_ACCESS_KEY_ID"))
        .context("Neither S3XFER_ACCESS_KEY nor AWS_ACCESS_KEY_ID environment variable is set")?;

    let secret_key = std::env::var("S3XFER_SECRET_KEY")
        .or_else(|_| std::env::var("AWS_SECRET_ACCESS_KEY"))
        .context(
            "Neither S3XFER_SECRET_KEY nor AWS_SECRET_ACCESS_KEY environment variable is set",
        )?;

    let mut config = Config::new();
    config
        .profiles
        .insert("default".to_string(), Profile::new(host.trim(), access_key, secret_key));
    config.default_profile = Some("default".to_string());

    if let Some(val) = env_u64("S3XFER_FINAL_WAIT_MS") {
        config.transfer.final_wait_ms = val;
    }
    if let Some(val) = env_u64("S3XFER_READ_DEADLINE_MS") {
        config.transfer.read_deadline_ms = val;
    }
    if let Some(val) = env_u64("S3XFER_WRITE_DEADLINE_MS") {
        config.transfer.write_deadline_ms = val;
    }

    Ok(config)
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Load configuration from a YAML file when given, else from the environment.
///
/// A requested profile must exist and becomes the default one.
pub fn load_config(config_path: Option<&str>, profile_name: Option<&str>) -> Result<Config> {
    if let Some(path) = config_path {
        let mut config = load_from_yaml(path)?;

        if let Some(name) = profile_name {
            if !config.profiles.contains_key(name) {
                anyhow::bail!("Profile '{}' not found in config file", name);
            }
            config.default_profile = Some(name.to_string());
        }

        Ok(config)
    } else {
        load_from_env()
    }
}
