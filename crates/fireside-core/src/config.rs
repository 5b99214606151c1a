//! Configuration resolution for Fireside.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Config file (`~/.fireside/settings.json` or an explicit path)
//! 3. Environment variables
//! 4. CLI arguments (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default HTTP port the gateway listens on.
pub const DEFAULT_PORT: u16 = 7654;

/// Default registration service for named tunnels.
pub const DEFAULT_REGISTRATION_URL: &str = "https://api.fireside.run";

/// Complete Fireside configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tunnel: TunnelSettings,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Data directory, falling back to `~/.fireside`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }
}

/// Tunnel subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunnelSettings {
    /// Tunnel binary name (resolved on `PATH`) or explicit path.
    pub binary: String,
    /// Base URL of the named-tunnel registration service.
    pub registration_url: String,
    /// Force local-only operation regardless of stored credentials.
    pub disabled: bool,
    /// How long boot waits for the first public URL.
    pub first_url_timeout_secs: u64,
    /// Interval between registration heartbeats for named tunnels.
    pub heartbeat_interval_secs: u64,
    /// First respawn delay after the tunnel process exits.
    pub backoff_floor_ms: u64,
    /// Upper bound on the respawn delay.
    pub backoff_ceiling_ms: u64,
}

impl Default for TunnelSettings {
    fn default() -> Self {
        Self {
            binary: "cloudflared".to_string(),
            registration_url: DEFAULT_REGISTRATION_URL.to_string(),
            disabled: false,
            first_url_timeout_secs: 15,
            heartbeat_interval_secs: 24 * 60 * 60,
            backoff_floor_ms: 2_000,
            backoff_ceiling_ms: 60_000,
        }
    }
}

impl TunnelSettings {
    pub const fn first_url_timeout(&self) -> Duration {
        Duration::from_secs(self.first_url_timeout_secs)
    }

    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub const fn backoff_floor(&self) -> Duration {
        Duration::from_millis(self.backoff_floor_ms)
    }

    pub const fn backoff_ceiling(&self) -> Duration {
        Duration::from_millis(self.backoff_ceiling_ms)
    }

    /// Reject timings the tunnel subsystem cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.backoff_floor_ms == 0 {
            return Err(Error::Config(
                "tunnel.backoff_floor_ms must be greater than zero".to_string(),
            ));
        }
        if self.backoff_ceiling_ms < self.backoff_floor_ms {
            return Err(Error::Config(format!(
                "tunnel.backoff_ceiling_ms ({}) must not be below backoff_floor_ms ({})",
                self.backoff_ceiling_ms, self.backoff_floor_ms
            )));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(Error::Config(
                "tunnel.heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration with hierarchical resolution.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(p) => load_config_file(p)?,
        None => match global_config_path() {
            Some(global) if global.exists() => load_config_file(&global)?,
            _ => Config::default(),
        },
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.tunnel.validate()?;

    Ok(config)
}

/// Default data directory: `~/.fireside`, or `.fireside` when no home is known.
pub fn default_data_dir() -> PathBuf {
    home_dir().map_or_else(|| PathBuf::from(".fireside"), |h| h.join(".fireside"))
}

/// Get the global config file path.
pub fn global_config_path() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".fireside").join("settings.json"))
}

fn home_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE").ok().map(PathBuf::from)
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME").ok().map(PathBuf::from)
    }
}

fn load_config_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Apply `FIRESIDE_*` overrides. `lookup` abstracts the environment so the
/// precedence rules can be exercised without mutating process state.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(n) = lookup("FIRESIDE_PORT").and_then(|v| v.parse().ok()) {
        config.server.port = n;
    }
    if let Some(val) = lookup("FIRESIDE_LOG_LEVEL") {
        config.server.log_level = val;
    }
    if let Some(val) = lookup("FIRESIDE_DATA_DIR") {
        config.server.data_dir = Some(PathBuf::from(val));
    }
    if let Some(val) = lookup("FIRESIDE_TUNNEL_BIN") {
        config.tunnel.binary = val;
    }
    if let Some(val) = lookup("FIRESIDE_REGISTRATION_URL") {
        config.tunnel.registration_url = val;
    }
    if let Some(val) = lookup("FIRESIDE_NO_TUNNEL") {
        config.tunnel.disabled = matches!(val.as_str(), "1" | "true" | "yes");
    }
}
