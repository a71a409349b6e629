//! Coordination service: one entry point per client request
//!
//! Put: placement → clock merge/advance → cache (best-effort) → local store
//! (authoritative) → write quorum over the rest of the preference list.
//!
//! Get: cache → read quorum → local store, stopping at the first that answers.
//! The local store stands in for the coordinator's replica on both paths, so
//! the read quorum asks the rest of the preference list for `R-1` answers.

use crate::common::{
    dedup_versions, merged_clock, validate_key, ConsistencyLevel, Error, QuorumConfig, Result, Store,
    VectorClock, VersionedRecord, METRICS,
};
use crate::coordinator::cache::Cache;
use crate::coordinator::node_client::NodeClient;
use crate::coordinator::placement::PlacementManager;
use crate::coordinator::quorum::{QuorumCoordinator, RequestOptions};
use crate::coordinator::reconcile::{KeepAllVersions, Reconciler};
use std::sync::Arc;
use std::time::Duration;

pub struct CoordinationService {
    placement: Arc<PlacementManager>,
    quorum: QuorumCoordinator,
    quorum_config: QuorumConfig,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    reconciler: Arc<dyn Reconciler>,
}

impl CoordinationService {
    pub fn new(
        placement: Arc<PlacementManager>,
        quorum_config: QuorumConfig,
        client: Arc<dyn NodeClient>,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        max_quorum_duration: Duration,
    ) -> Self {
        Self {
            placement,
            quorum: QuorumCoordinator::new(client, max_quorum_duration),
            quorum_config,
            store,
            cache,
            reconciler: Arc::new(KeepAllVersions),
        }
    }

    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = reconciler;
        self
    }

    pub fn placement(&self) -> &PlacementManager {
        &self.placement
    }

    pub fn quorum_config(&self) -> QuorumConfig {
        self.quorum_config
    }

    pub fn consistency_level(&self) -> ConsistencyLevel {
        self.quorum_config.consistency_level()
    }

    pub async fn put(
        &self,
        key: &str,
        value: &str,
        client_clock: Option<VectorClock>,
    ) -> Result<VectorClock> {
        self.put_with(key, value, client_clock, &RequestOptions::default())
            .await
    }

    /// Write a new version of `key` and return its clock.
    pub async fn put_with(
        &self,
        key: &str,
        value: &str,
        client_clock: Option<VectorClock>,
        opts: &RequestOptions,
    ) -> Result<VectorClock> {
        validate_key(key)?;

        let preference_list = self.placement.preference_list(key)?;
        let coordinator = &preference_list[0];

        let clock = self.next_clock(key, coordinator, client_clock)?;
        let version = VersionedRecord::new(value, clock.clone());

        if let Err(e) = self.cache.write(key, &version).await {
            METRICS.cache_write_failures.inc();
            tracing::warn!(key = %key, error = %e, "Cache write failed");
        }

        self.store.append(key, version.clone()).map_err(|e| match e {
            Error::Storage(_) => e,
            other => Error::Storage(other.to_string()),
        })?;
        tracing::debug!(key = %key, coordinator = %coordinator, clock = ?clock, "Version persisted locally");

        self.quorum
            .write_quorum(
                &preference_list[1..],
                key,
                &version,
                self.quorum_config.w,
                opts,
            )
            .await?;

        tracing::info!(key = %key, coordinator = %coordinator, "PUT complete");
        Ok(clock)
    }

    /// Merge of every stored clock and the client's, advanced by the coordinator.
    fn next_clock(
        &self,
        key: &str,
        coordinator: &str,
        client_clock: Option<VectorClock>,
    ) -> Result<VectorClock> {
        let stored = match self.store.get_all_versions(key) {
            Ok(versions) => merged_clock(&versions),
            Err(Error::NotFound(_)) => VectorClock::new(),
            Err(e) => return Err(e),
        };
        let merged = match client_clock {
            Some(client) => stored.merge(&client),
            None => stored,
        };
        Ok(merged.advance(coordinator))
    }

    pub async fn get(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        self.get_with(key, &RequestOptions::default()).await
    }

    /// Every known version of `key`.
    pub async fn get_with(&self, key: &str, opts: &RequestOptions) -> Result<Vec<VersionedRecord>> {
        validate_key(key)?;

        match self.cache.read(key).await {
            Ok(Some(versions)) if !versions.is_empty() => {
                METRICS.cache_hits.inc();
                tracing::debug!(key = %key, versions = versions.len(), "Cache hit");
                return Ok(self.reconciler.reconcile(versions));
            }
            Ok(_) => METRICS.cache_misses.inc(),
            Err(e) => {
                METRICS.cache_misses.inc();
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
            }
        }

        let preference_list = self.placement.preference_list(key)?;
        let coordinator = &preference_list[0];

        // The local store holds the coordinator's replica, so it is the first answer
        let local = match self.store.get_all_versions(key) {
            Ok(versions) => Some(versions),
            Err(Error::NotFound(_)) => Some(Vec::new()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Local replica read failed");
                None
            }
        };
        let needed = match local {
            Some(_) => self.quorum_config.r.saturating_sub(1),
            None => self.quorum_config.r,
        };

        match self
            .quorum
            .read_quorum(&preference_list[1..], key, needed, opts)
            .await
        {
            Ok(remote) => {
                let mut versions: Vec<VersionedRecord> = local
                    .unwrap_or_default()
                    .into_iter()
                    .map(|v| v.with_origin(coordinator.clone()))
                    .collect();
                versions.extend(remote);
                let versions = dedup_versions(versions);
                if !versions.is_empty() {
                    return Ok(self.reconciler.reconcile(versions));
                }
                tracing::debug!(key = %key, "Read quorum found no versions");
            }
            // Cancelled by the caller: nothing below should run either
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => {
                METRICS.store_fallbacks.inc();
                tracing::warn!(key = %key, error = %e, "Read quorum failed, falling back to store");
            }
        }

        let versions = self.store.get_all_versions(key)?;
        self.repopulate_cache(key, &versions);
        Ok(self.reconciler.reconcile(versions))
    }

    /// Best-effort background refill of the cache after a store read.
    fn repopulate_cache(&self, key: &str, versions: &[VersionedRecord]) {
        if !self.cache.is_enabled() {
            return;
        }
        let cache = self.cache.clone();
        let key = key.to_string();
        let versions = versions.to_vec();
        tokio::spawn(async move {
            for version in &versions {
                if let Err(e) = cache.write(&key, version).await {
                    METRICS.cache_write_failures.inc();
                    tracing::warn!(key = %key, error = %e, "Cache repopulate failed");
                    return;
                }
            }
            tracing::debug!(key = %key, versions = versions.len(), "Cache repopulated");
        });
    }

    /// Ring passthrough for debugging.
    pub fn preference_list(&self, key: &str) -> Result<Vec<String>> {
        validate_key(key)?;
        self.placement.preference_list(key)
    }

    /// Drop every locally stored version of `key` and evict it from the cache.
    pub async fn delete(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.store.delete_all_versions(key)?;
        if let Err(e) = self.cache.evict(key).await {
            tracing::warn!(key = %key, error = %e, "Cache evict failed");
        }
        tracing::info!(key = %key, "DELETE complete");
        Ok(())
    }

    pub fn all_keys(&self) -> Result<Vec<String>> {
        self.store.get_all_keys()
    }

    pub fn versions_for(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        self.store.get_all_versions(key)
    }

    /// Copy every stored version into the cache; returns how many were written.
    pub async fn rehydrate_cache(&self) -> Result<usize> {
        if !self.cache.is_enabled() {
            return Ok(0);
        }

        let mut count = 0;
        for key in self.all_keys()? {
            let versions = match self.versions_for(&key) {
                Ok(versions) => versions,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Skipping key during rehydration");
                    continue;
                }
            };
            for version in &versions {
                match self.cache.write(&key, version).await {
                    Ok(()) => count += 1,
                    Err(e) => {
                        METRICS.cache_write_failures.inc();
                        tracing::warn!(key = %key, error = %e, "Failed to write key to cache");
                    }
                }
            }
        }

        tracing::info!("Rehydrated {} versions into cache", count);
        Ok(count)
    }
}
