//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (SWITCHYARD_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use switchyard_core::{RouterConfig, DEFAULT_BUFFER_CAPACITY};
use switchyard_relay::RelayConfig;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Event router configuration.
    #[serde(default)]
    pub router: RouterSection,

    /// Websocket relay configuration.
    #[serde(default)]
    pub relay: RelaySection,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Event router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Per-subscription buffer capacity. Must be greater than zero.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Registry lock stripes (power of two). Omit for automatic.
    #[serde(default)]
    pub shard_amount: Option<usize>,

    /// Interval of the abandoned subscription sweep in milliseconds.
    #[serde(default = "default_prune_interval")]
    pub prune_interval_ms: u64,
}

/// Websocket relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySection {
    /// Idle time before a keepalive is written, in milliseconds.
    #[serde(default = "default_keepalive")]
    pub keepalive_ms: u64,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("SWITCHYARD_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("SWITCHYARD_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_true() -> bool {
    true
}

fn default_buffer_capacity() -> usize {
    DEFAULT_BUFFER_CAPACITY
}

fn default_prune_interval() -> u64 {
    60_000 // 1 minute
}

fn default_keepalive() -> u64 {
    30_000 // 30 seconds
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            router: RouterSection::default(),
            relay: RelaySection::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            shard_amount: None,
            prune_interval_ms: default_prune_interval(),
        }
    }
}

impl Default for RelaySection {
    fn default() -> Self {
        Self {
            keepalive_ms: default_keepalive(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// `SWITCHYARD_CONFIG` names an explicit file; otherwise the default
    /// paths are tried in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("SWITCHYARD_CONFIG") {
            return Self::from_file(shellexpand::tilde(&path).as_ref());
        }

        let config_paths = [
            "switchyard.toml",
            "/etc/switchyard/switchyard.toml",
            "~/.config/switchyard/switchyard.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid host:port {}:{}", self.host, self.port))
    }

    /// Router settings. Validated when the router is built.
    #[must_use]
    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            buffer_capacity: self.router.buffer_capacity,
            shard_amount: self.router.shard_amount,
        }
    }

    /// Relay settings.
    #[must_use]
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            keepalive_interval: Duration::from_millis(self.relay.keepalive_ms),
        }
    }

    /// Interval of the abandoned subscription sweep.
    #[must_use]
    pub fn prune_interval(&self) -> Duration {
        Duration::from_millis(self.router.prune_interval_ms)
    }
}
