//! Storage node server

use crate::common::{Error, MemStore, NodeConfig, Result};
use crate::coordinator::server::shutdown_signal;
use crate::node::http::{create_router, NodeState};
use std::sync::Arc;

pub struct NodeServer {
    config: NodeConfig,
}

impl NodeServer {
    pub fn new(config: NodeConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        tracing::info!("Starting storage node: {}", self.config.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);

        let state = NodeState {
            store: Arc::new(MemStore::new()),
            node_id: self.config.node_id.clone(),
        };
        let router = create_router(state);
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Storage node ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}
