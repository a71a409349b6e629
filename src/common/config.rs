//! Configuration for ringkv components

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an alternative config file
pub const CONFIG_ENV: &str = "RINGKV_CONFIG";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Storage-node-specific config
    #[serde(default)]
    pub node: NodeConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from an optional TOML file (`path`, then `$RINGKV_CONFIG`, then
    /// `./ringkv.toml`) overlaid with `RINGKV__SECTION__FIELD` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("ringkv.toml"));

        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("RINGKV").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

/// Replica set size and read/write thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumConfig {
    pub n: usize,
    pub r: usize,
    pub w: usize,
}

impl Default for QuorumConfig {
    fn default() -> Self {
        Self { n: 3, r: 2, w: 2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConsistencyLevel {
    Strong,
    Eventual,
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyLevel::Strong => f.write_str("STRONG"),
            ConsistencyLevel::Eventual => f.write_str("EVENTUAL"),
        }
    }
}

impl QuorumConfig {
    pub fn consistency_level(&self) -> ConsistencyLevel {
        if self.r + self.w > self.n {
            ConsistencyLevel::Strong
        } else {
            ConsistencyLevel::Eventual
        }
    }

    /// Read and write sets may miss each other
    pub fn is_sloppy(&self) -> bool {
        self.consistency_level() == ConsistencyLevel::Eventual
    }

    pub fn validate(&self) -> Result<()> {
        if self.n == 0 {
            return Err(Error::InvalidConfig("quorum n must be at least 1".into()));
        }
        if self.r == 0 || self.r > self.n {
            return Err(Error::InvalidConfig(format!(
                "quorum r must be in 1..={}, got {}",
                self.n, self.r
            )));
        }
        if self.w == 0 || self.w > self.n {
            return Err(Error::InvalidConfig(format!(
                "quorum w must be in 1..={}, got {}",
                self.n, self.w
            )));
        }
        Ok(())
    }
}

/// One physical node of the ring topology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub address: String,
    #[serde(default = "default_weight")]
    pub weight: usize,
}

fn default_weight() -> usize {
    1
}

impl NodeSpec {
    pub fn new(address: impl Into<String>, weight: usize) -> Self {
        Self {
            address: address.into(),
            weight,
        }
    }

    /// Parse `address` or `address=weight`
    pub fn parse(s: &str) -> Result<Self> {
        match s.rsplit_once('=') {
            Some((address, weight)) => {
                let weight = weight
                    .parse()
                    .map_err(|_| Error::InvalidConfig(format!("invalid node weight: {}", s)))?;
                Ok(Self::new(address, weight))
            }
            None => Ok(Self::new(s, 1)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    PathBuf::from("./ringkv-data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

/// What a read returns when a key holds several versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Every distinct version, dominated ones included
    #[default]
    KeepAll,
    /// Only versions no other returned version dominates
    PruneDominated,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Name used in logs
    #[serde(default = "default_coordinator_id")]
    pub node_id: String,

    /// Bind address for HTTP API
    #[serde(default = "default_coordinator_addr")]
    pub bind_addr: SocketAddr,

    /// Ring topology, in insertion order
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    /// Virtual nodes per unit of weight
    #[serde(default = "default_virtual_nodes")]
    pub virtual_nodes: usize,

    #[serde(default)]
    pub quorum: QuorumConfig,

    /// Upper bound on a whole quorum operation
    #[serde(default = "default_quorum_timeout")]
    pub quorum_timeout_ms: u64,

    /// Per-request timeout for a single node call
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_ms: u64,

    /// Remote cache node; empty disables the cache
    #[serde(default)]
    pub cache_url: String,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub reconcile: ReconcileMode,

    /// Copy every stored version into the cache at startup
    #[serde(default = "default_rehydrate")]
    pub rehydrate_on_start: bool,
}

fn default_coordinator_id() -> String {
    "coordinator".to_string()
}
fn default_coordinator_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5000))
}
fn default_virtual_nodes() -> usize {
    3
}
fn default_quorum_timeout() -> u64 {
    2_000
}
fn default_rpc_timeout() -> u64 {
    1_000
}
fn default_rehydrate() -> bool {
    true
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            node_id: default_coordinator_id(),
            bind_addr: default_coordinator_addr(),
            nodes: Vec::new(),
            virtual_nodes: default_virtual_nodes(),
            quorum: QuorumConfig::default(),
            quorum_timeout_ms: default_quorum_timeout(),
            rpc_timeout_ms: default_rpc_timeout(),
            cache_url: String::new(),
            store: StoreConfig::default(),
            reconcile: ReconcileMode::default(),
            rehydrate_on_start: default_rehydrate(),
        }
    }
}

impl CoordinatorConfig {
    pub fn quorum_timeout(&self) -> Duration {
        Duration::from_millis(self.quorum_timeout_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        self.quorum.validate()?;
        if self.nodes.is_empty() {
            return Err(Error::InvalidConfig("ring topology is empty".into()));
        }
        if self.virtual_nodes == 0 {
            return Err(Error::InvalidConfig("virtual_nodes must be at least 1".into()));
        }
        if let Some(node) = self.nodes.iter().find(|n| n.weight == 0) {
            return Err(Error::InvalidConfig(format!(
                "node {} has zero weight",
                node.address
            )));
        }
        if self.quorum_timeout_ms == 0 {
            return Err(Error::InvalidConfig("quorum_timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,

    #[serde(default = "default_node_addr")]
    pub bind_addr: SocketAddr,
}

fn default_node_id() -> String {
    "node-1".to_string()
}
fn default_node_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 6001))
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            bind_addr: default_node_addr(),
        }
    }
}
