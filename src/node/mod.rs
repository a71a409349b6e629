//! Storage node implementation
//!
//! A storage node keeps every version it is sent in memory and answers
//! replica reads. Nodes know nothing about the ring or quorums.

pub mod http;
pub mod server;

pub use http::{create_router, NodeState};
pub use server::NodeServer;
