//! Configuration loading and types for Polystore.
//!
//! Configuration is assembled once at startup from built-in defaults, an
//! optional YAML file, and environment overrides, in that order. Each
//! subsection governs a different part of the system: the public HTTP
//! listener, cluster coordination, logging, and metrics.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

/// Invalid configuration values detected by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("cluster.replication_factor must be at least 1")]
    ReplicationFactor,

    #[error("cluster.gossip_fanout must be at least 1")]
    GossipFanout,

    #[error("cluster.failure_threshold must be at least 1")]
    FailureThreshold,

    #[error("cluster.{0} must be greater than zero")]
    ZeroInterval(&'static str),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Public HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Cluster membership and replication settings.
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Cluster / replication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Whether clustering is enabled.
    #[serde(default)]
    pub enabled: bool,

    /// Port of the peer-facing listener (join, gossip, replication).
    #[serde(default = "default_cluster_port")]
    pub listen_port: u16,

    /// Address peers should use to reach this node.
    #[serde(default = "default_advertise_address")]
    pub advertise_address: String,

    /// Number of nodes holding each key, primary included.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Seed nodes (`host:port`) joined once at startup.
    #[serde(default)]
    pub seeds: Vec<String>,

    /// Seconds between failure-detector rounds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds between gossip rounds.
    #[serde(default = "default_gossip_interval")]
    pub gossip_interval_secs: u64,

    /// Peers contacted per gossip round.
    #[serde(default = "default_gossip_fanout")]
    pub gossip_fanout: usize,

    /// Timeout in seconds for every outbound peer request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Consecutive failed probes before a peer is marked inactive.
    ///
    /// Values above 1 deviate from single-probe detection and trade
    /// detection latency for tolerance of transient blips.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_port: default_cluster_port(),
            advertise_address: default_advertise_address(),
            replication_factor: default_replication_factor(),
            seeds: Vec::new(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            gossip_interval_secs: default_gossip_interval(),
            gossip_fanout: default_gossip_fanout(),
            request_timeout_secs: default_request_timeout(),
            failure_threshold: default_failure_threshold(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

impl Config {
    /// Reject values the cluster layer cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.cluster;
        if c.replication_factor < 1 {
            return Err(ConfigError::ReplicationFactor);
        }
        if c.gossip_fanout < 1 {
            return Err(ConfigError::GossipFanout);
        }
        if c.failure_threshold < 1 {
            return Err(ConfigError::FailureThreshold);
        }
        if c.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("heartbeat_interval_secs"));
        }
        if c.gossip_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval("gossip_interval_secs"));
        }
        if c.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroInterval("request_timeout_secs"));
        }
        Ok(())
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Recognised: `DB_PORT`, `CLUSTER_ENABLED`, `CLUSTER_PORT`,
    /// `REPLICATION_FACTOR`, `CLUSTER_SEEDS`, `CLUSTER_ADVERTISE_ADDRESS`.
    /// Empty or unparsable values leave the current setting untouched,
    /// except `CLUSTER_ENABLED` where anything but `true`/`1` disables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        if let Some(port) = var("DB_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(enabled) = var("CLUSTER_ENABLED") {
            self.cluster.enabled = enabled == "true" || enabled == "1";
        }
        if let Some(port) = var("CLUSTER_PORT").and_then(|v| v.parse().ok()) {
            self.cluster.listen_port = port;
        }
        if let Some(factor) = var("REPLICATION_FACTOR").and_then(|v| v.parse().ok()) {
            self.cluster.replication_factor = factor;
        }
        if let Some(seeds) = var("CLUSTER_SEEDS") {
            self.cluster.seeds = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(address) = var("CLUSTER_ADVERTISE_ADDRESS") {
            self.cluster.advertise_address = address;
        }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_cluster_port() -> u16 {
    9090
}

fn default_advertise_address() -> String {
    "localhost".to_string()
}

fn default_replication_factor() -> usize {
    1
}

fn default_heartbeat_interval() -> u64 {
    5
}

fn default_gossip_interval() -> u64 {
    10
}

fn default_gossip_fanout() -> usize {
    2
}

fn default_request_timeout() -> u64 {
    10
}

fn default_failure_threshold() -> u32 {
    1
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    let config: Config = serde_yaml::from_str(&contents)?;
    Ok(config)
}

/// Build the effective configuration: file (or defaults), then the process
/// environment, then validation.
pub fn resolve_config(path: Option<&str>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => load_config(p)?,
        None => Config::default(),
    };
    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}
