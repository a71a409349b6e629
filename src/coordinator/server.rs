//! Coordinator server

use crate::common::{CoordinatorConfig, Error, MemStore, Result, Store, StoreBackend};
use crate::coordinator::cache::{Cache, HttpCache};
use crate::coordinator::http::{create_router, CoordState};
use crate::coordinator::node_client::HttpNodeClient;
use crate::coordinator::placement::PlacementManager;
use crate::coordinator::reconcile::reconciler_for;
use crate::coordinator::service::CoordinationService;
use std::sync::Arc;

pub struct Coordinator {
    config: CoordinatorConfig,
}

fn open_store(config: &CoordinatorConfig) -> Result<Arc<dyn Store>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(MemStore::new())),
        #[cfg(feature = "sled-backend")]
        StoreBackend::Sled => Ok(Arc::new(crate::common::SledStore::open(&config.store.path)?)),
        #[cfg(not(feature = "sled-backend"))]
        StoreBackend::Sled => Err(Error::InvalidConfig(
            "sled store requested but ringkv was built without the sled-backend feature".into(),
        )),
    }
}

/// Wire a coordination service from configuration with the HTTP transport.
pub fn build_service(config: &CoordinatorConfig) -> Result<CoordinationService> {
    config.validate()?;

    let placement = Arc::new(PlacementManager::with_nodes(
        config.virtual_nodes,
        config.quorum.n,
        &config.nodes,
    ));
    let client = Arc::new(HttpNodeClient::new(config.rpc_timeout())?);
    let cache: Arc<dyn Cache> = Arc::new(HttpCache::new(
        config.cache_url.clone(),
        config.rpc_timeout(),
    )?);
    let store = open_store(config)?;

    Ok(CoordinationService::new(
        placement,
        config.quorum,
        client,
        store,
        cache,
        config.quorum_timeout(),
    )
    .with_reconciler(reconciler_for(config.reconcile)))
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self { config }
    }

    pub async fn serve(self) -> Result<()> {
        let quorum = self.config.quorum;
        tracing::info!("Starting coordinator: {}", self.config.node_id);
        tracing::info!("  HTTP API: {}", self.config.bind_addr);
        tracing::info!("  Nodes: {}", self.config.nodes.len());
        tracing::info!(
            "  Quorum: N={} R={} W={} ({})",
            quorum.n,
            quorum.r,
            quorum.w,
            quorum.consistency_level()
        );
        if self.config.cache_url.is_empty() {
            tracing::info!("  Cache: disabled");
        } else {
            tracing::info!("  Cache: {}", self.config.cache_url);
        }

        let service = Arc::new(build_service(&self.config)?);

        if self.config.rehydrate_on_start {
            if let Err(e) = service.rehydrate_cache().await {
                tracing::warn!("Cache rehydration failed: {}", e);
            }
        }

        let router = create_router(CoordState { service });
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!("✓ Coordinator ready");

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

pub(crate) async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
