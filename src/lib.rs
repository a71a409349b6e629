//! # ringkv
//!
//! A Dynamo-style replicated key-value store with:
//! - Consistent hashing with weighted virtual nodes for placement
//! - Vector clocks for versioning; concurrent writes are kept as siblings
//! - Tunable N/R/W quorums with deadlines and cancellation
//! - Read path through cache, then read quorum, then the coordinator's store
//!
//! ## Architecture

#![allow(clippy::result_large_err)]
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   client ─────▶ │         Coordinator          │
//!   (HTTP)        │  ring → preference list      │
//!                 │  clock merge + advance       │
//!                 │  cache → quorum → store      │
//!                 └───────┬──────────────┬───────┘
//!                         │ HTTP/JSON    │ HTTP/JSON
//!       ┌─────────────┬───┴─────────┐    │
//!   ┌───▼────┐   ┌────▼───┐   ┌─────▼──┐ ┌▼───────┐
//!   │ Node A │   │ Node B │   │ Node C │ │ Cache  │
//!   └────────┘   └────────┘   └────────┘ └────────┘
//! ```
//!
//! ## Usage
//!
//! ### Start storage nodes
//! ```bash
//! ringkv-node serve --id node-a --bind 127.0.0.1:6001
//! ringkv-node serve --id node-b --bind 127.0.0.1:6002
//! ringkv-node serve --id node-c --bind 127.0.0.1:6003
//! ```
//!
//! ### Start a coordinator
//! ```bash
//! ringkv-coord serve \
//!   --bind 0.0.0.0:5000 \
//!   --node 127.0.0.1:6001,127.0.0.1:6002,127.0.0.1:6003=2 \
//!   --n 3 --r 2 --w 2
//! ```
//!
//! ### Use the CLI
//! ```bash
//! ringkv put my-key hello --coordinator http://localhost:5000
//! ringkv get my-key
//! ringkv prefs my-key
//! ringkv delete my-key
//! ```

pub mod common;
pub mod coordinator;
pub mod node;

// Re-export commonly used types
pub use common::{Config, Error, Result, VectorClock, VersionedRecord};
pub use coordinator::{CoordinationService, Coordinator};
pub use node::NodeServer;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
