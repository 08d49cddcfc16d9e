//! Configuration module for filebin.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::{FilebinError, Result};

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port number to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Seconds an unauthenticated connection may wait before sending a line.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    /// Seconds an authenticated connection may stay idle between requests.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Seconds a transfer may stall before it is aborted.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5001
}

fn default_max_connections() -> usize {
    64
}

fn default_read_timeout() -> u64 {
    30
}

fn default_idle_timeout() -> u64 {
    600
}

fn default_transfer_timeout() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            read_timeout_secs: default_read_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            transfer_timeout_secs: default_transfer_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_timeout_secs)
    }
}

/// File storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding files available to clients.
    #[serde(default = "default_active_dir")]
    pub active_dir: String,
    /// Directory holding soft-deleted files.
    #[serde(default = "default_recycle_dir")]
    pub recycle_dir: String,
    /// Days a recycled file is kept before it is purged.
    #[serde(default = "default_retention_days")]
    pub retention_days: u64,
    /// Seconds between retention sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Maximum upload size in megabytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_mb: u64,
}

fn default_active_dir() -> String {
    "server_files".to_string()
}

fn default_recycle_dir() -> String {
    "recycle_bin".to_string()
}

fn default_retention_days() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600 // 1 hour
}

fn default_max_upload_size() -> u64 {
    1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            active_dir: default_active_dir(),
            recycle_dir: default_recycle_dir(),
            retention_days: default_retention_days(),
            sweep_interval_secs: default_sweep_interval(),
            max_upload_size_mb: default_max_upload_size(),
        }
    }
}

impl StorageConfig {
    /// Age after which a recycle entry is eligible for purge.
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_days.saturating_mul(24 * 60 * 60))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Login throttling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Failed attempts per username before lockout.
    #[serde(default = "default_max_login_attempts")]
    pub max_login_attempts: u32,
    /// Lockout (and counting window) duration in seconds.
    #[serde(default = "default_lockout")]
    pub lockout_secs: u64,
}

fn default_max_login_attempts() -> u32 {
    5
}

fn default_lockout() -> u64 {
    300 // 5 minutes
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_login_attempts: default_max_login_attempts(),
            lockout_secs: default_lockout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/filebin.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// A user allowed to log in.
///
/// Exactly one of `password` (plaintext, hashed at load) or `password_hash`
/// (Argon2 PHC string) must be set.
#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub password_hash: Option<String>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// File storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Login throttling configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Credential table.
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FilebinError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FilebinError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FILEBIN_HOST`: bind address
    /// - `FILEBIN_PORT`: listen port (ignored if not a valid port)
    /// - `FILEBIN_ACTIVE_DIR`: active storage directory
    /// - `FILEBIN_RECYCLE_DIR`: recycle bin directory
    pub fn apply_env_overrides(&mut self) {
        if let Some(host) = non_empty_env("FILEBIN_HOST") {
            self.server.host = host;
        }
        if let Some(port) = non_empty_env("FILEBIN_PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(dir) = non_empty_env("FILEBIN_ACTIVE_DIR") {
            self.storage.active_dir = dir;
        }
        if let Some(dir) = non_empty_env("FILEBIN_RECYCLE_DIR") {
            self.storage.recycle_dir = dir;
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.storage.active_dir.is_empty() || self.storage.recycle_dir.is_empty() {
            return Err(FilebinError::Config(
                "storage directories must not be empty".to_string(),
            ));
        }
        if self.storage.active_dir == self.storage.recycle_dir {
            return Err(FilebinError::Config(
                "active_dir and recycle_dir must be different directories".to_string(),
            ));
        }
        if self.storage.retention_days == 0 {
            return Err(FilebinError::Config(
                "retention_days must be at least 1".to_string(),
            ));
        }
        if self.storage.sweep_interval_secs == 0 {
            return Err(FilebinError::Config(
                "sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(FilebinError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.users.is_empty() {
            return Err(FilebinError::Config(
                "no users configured; add at least one [[users]] entry".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(FilebinError::Config("username must not be empty".to_string()));
            }
            if !seen.insert(user.username.as_str()) {
                return Err(FilebinError::Config(format!(
                    "duplicate user '{}'",
                    user.username
                )));
            }
            if user.password.is_some() == user.password_hash.is_some() {
                return Err(FilebinError::Config(format!(
                    "user '{}' must set exactly one of password or password_hash",
                    user.username
                )));
            }
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
