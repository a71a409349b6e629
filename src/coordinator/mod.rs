//! Coordinator implementation
//!
//! The coordinator is responsible for:
//! - Placement on the consistent hash ring (coordinator + preference list)
//! - Versioning writes with vector clocks
//! - Quorum replication to storage nodes
//! - Reads through cache → quorum → durable store

pub mod cache;
pub mod http;
pub mod node_client;
pub mod placement;
pub mod quorum;
pub mod reconcile;
pub mod server;
pub mod service;

pub use cache::{Cache, HttpCache, MemCache};
pub use node_client::{HttpNodeClient, NodeClient};
pub use placement::PlacementManager;
pub use quorum::{QuorumCoordinator, RequestOptions};
pub use reconcile::{KeepAllVersions, PruneDominated, Reconciler};
pub use server::{build_service, Coordinator};
pub use service::CoordinationService;
