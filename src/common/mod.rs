//! Common utilities and types shared across ringkv

pub mod config;
pub mod error;
pub mod hash;
pub mod metrics;
pub mod record;
pub mod storage;
pub mod tracing_middleware;
pub mod utils;
pub mod vclock;

pub use config::{
    Config, ConsistencyLevel, CoordinatorConfig, NodeConfig, NodeSpec, QuorumConfig,
    ReconcileMode, StoreBackend, StoreConfig,
};
pub use error::{Error, QuorumError, QuorumFailure, QuorumOp, Result};
pub use hash::{ring_position, vnode_label, ConsistentHashRing, VirtualNode};
pub use metrics::METRICS;
pub use record::{dedup_versions, merged_clock, VersionedRecord, WriteRequest};
pub use storage::{MemStore, Store};
pub use utils::{encode_key, node_base_url, parse_duration, validate_key};
pub use vclock::VectorClock;

#[cfg(feature = "sled-backend")]
pub use storage::SledStore;
