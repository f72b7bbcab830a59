//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (BEACON_*), used as defaults
//! - TOML configuration file
//! - `--config <path>` on the command line

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use beacon_core::LivenessPolicy;
use beacon_protocol::http::{Limits, DEFAULT_MAX_BODY_SIZE, DEFAULT_MAX_HEADER_SIZE};
use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host both listeners bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Event ingestion endpoint.
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Subscriber endpoint.
    #[serde(default)]
    pub subscribe: SubscribeConfig,

    /// Broadcast tick.
    #[serde(default)]
    pub broadcast: BroadcastConfig,

    /// Subscriber liveness checks.
    #[serde(default)]
    pub liveness: LivenessConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Ingestion endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_port")]
    pub port: u16,

    /// Largest accepted request head, in bytes.
    #[serde(default = "default_max_header_size")]
    pub max_header_size: usize,

    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,

    /// Time a client has to deliver a complete request.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    /// Pending event cap. 0 disables the cap.
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
}

/// Subscriber endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeConfig {
    #[serde(default = "default_subscribe_port")]
    pub port: u16,

    /// Frames a subscriber may have queued before it counts as stalled.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Maximum inbound message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Broadcast configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Broadcast interval in milliseconds.
    #[serde(default = "default_tick")]
    pub tick_ms: u64,
}

/// Liveness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessConfig {
    /// How often subscribers are checked, in milliseconds.
    #[serde(default = "default_check_interval")]
    pub check_interval_ms: u64,

    /// Idle time before a probe is sent, in milliseconds.
    #[serde(default = "default_probe_after")]
    pub probe_after_ms: u64,

    /// Idle time before a subscriber is dropped, in milliseconds.
    #[serde(default = "default_liveness_timeout")]
    pub timeout_ms: u64,
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
    std::env::var("BEACON_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn port_from_env(var: &str, fallback: u16) -> u16 {
    std::env::var(var)
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(fallback)
}

fn default_ingest_port() -> u16 {
    port_from_env("BEACON_INGEST_PORT", 8080)
}

fn default_subscribe_port() -> u16 {
    port_from_env("BEACON_SUBSCRIBE_PORT", 8081)
}

fn default_max_header_size() -> usize {
    DEFAULT_MAX_HEADER_SIZE
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

fn default_read_timeout() -> u64 {
    10_000
}

fn default_max_pending_events() -> usize {
    65_536
}

fn default_outbox_capacity() -> usize {
    1024
}

fn default_max_message_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_tick() -> u64 {
    50
}

fn default_check_interval() -> u64 {
    1_000
}

fn default_probe_after() -> u64 {
    10_000 // 10 seconds
}

fn default_liveness_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            ingest: IngestConfig::default(),
            subscribe: SubscribeConfig::default(),
            broadcast: BroadcastConfig::default(),
            liveness: LivenessConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            port: default_ingest_port(),
            max_header_size: default_max_header_size(),
            max_body_size: default_max_body_size(),
            read_timeout_ms: default_read_timeout(),
            max_pending_events: default_max_pending_events(),
        }
    }
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self {
            port: default_subscribe_port(),
            outbox_capacity: default_outbox_capacity(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick(),
        }
    }
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval(),
            probe_after_ms: default_probe_after(),
            timeout_ms: default_liveness_timeout(),
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

impl IngestConfig {
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            max_header_size: self.max_header_size,
            max_body_size: self.max_body_size,
        }
    }

    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl BroadcastConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }
}

impl LivenessConfig {
    #[must_use]
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    #[must_use]
    pub fn policy(&self) -> LivenessPolicy {
        LivenessPolicy {
            probe_after: Duration::from_millis(self.probe_after_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// An explicit path must exist; otherwise the default locations are
    /// searched and the first existing file wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen config file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        // Try to load from default paths
        let config_paths = [
            "beacon.toml",
            "/etc/beacon/beacon.toml",
            "~/.config/beacon/beacon.toml",
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

    /// Socket address of the ingestion endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn ingest_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.ingest.port)
    }

    /// Socket address of the subscriber endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve.
    pub fn subscribe_addr(&self) -> Result<SocketAddr> {
        resolve(&self.host, self.subscribe.port)
    }
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()
        .with_context(|| format!("Invalid host: {host}"))?
        .next()
        .ok_or_else(|| anyhow!("Host {host} resolved to no addresses"))
}
