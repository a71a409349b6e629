//! Read-through cache in front of the quorum path
//!
//! Same versioned-record shape as the store. The cache is advisory: the
//! coordination service never fails a request because the cache did.

use crate::common::{Error, MemStore, Result, Store, VersionedRecord, WriteRequest};
use crate::coordinator::node_client::{HttpNodeClient, NodeClient};
use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Cache: Send + Sync {
    /// Add `version` to the cached list for `key`.
    async fn write(&self, key: &str, version: &VersionedRecord) -> Result<()>;

    /// Cached versions for `key`; `None` is a miss.
    async fn read(&self, key: &str) -> Result<Option<Vec<VersionedRecord>>>;

    async fn evict(&self, key: &str) -> Result<()>;

    /// A disabled cache always misses and ignores writes.
    fn is_enabled(&self) -> bool {
        true
    }
}

/// Process-local cache
#[derive(Default)]
pub struct MemCache {
    versions: MemStore,
}

impl MemCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemCache {
    async fn write(&self, key: &str, version: &VersionedRecord) -> Result<()> {
        self.versions.append_if_absent(key, version.clone())?;
        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<VersionedRecord>>> {
        match self.versions.get_all_versions(key) {
            Ok(versions) => Ok(Some(versions)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.versions.delete_all_versions(key)
    }
}

/// Cache hosted by a remote storage node. An empty base URL disables it.
pub struct HttpCache {
    base_url: String,
    client: HttpNodeClient,
}

impl HttpCache {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into(),
            client: HttpNodeClient::new(timeout)?,
        })
    }

    pub fn disabled() -> Result<Self> {
        Self::new("", Duration::from_secs(1))
    }
}

#[async_trait]
impl Cache for HttpCache {
    async fn write(&self, key: &str, version: &VersionedRecord) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.client
            .write_request(&self.base_url, &WriteRequest::for_version(key, version))
            .await
    }

    async fn read(&self, key: &str) -> Result<Option<Vec<VersionedRecord>>> {
        if !self.is_enabled() {
            return Ok(None);
        }
        match self.client.read(&self.base_url, key).await {
            Ok(versions) if versions.is_empty() => Ok(None),
            Ok(versions) => Ok(Some(versions)),
            Err(Error::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn evict(&self, key: &str) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.client.delete(&self.base_url, key).await
    }

    fn is_enabled(&self) -> bool {
        !self.base_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::VectorClock;

    #[tokio::test]
    async fn test_mem_cache_hit_and_miss() {
        let cache = MemCache::new();
        assert!(cache.read("foo").await.unwrap().is_none());

        let clock: VectorClock = [("A", 1)].into_iter().collect();
        cache
            .write("foo", &VersionedRecord::new("bar", clock))
            .await
            .unwrap();
        let hit = cache.read("foo").await.unwrap().unwrap();
        assert_eq!(hit.len(), 1);

        cache.evict("foo").await.unwrap();
        assert!(cache.read("foo").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disabled_http_cache() {
        let cache = HttpCache::disabled().unwrap();
        assert!(!cache.is_enabled());
        assert!(cache.read("foo").await.unwrap().is_none());
        cache
            .write("foo", &VersionedRecord::new("bar", VectorClock::new()))
            .await
            .unwrap();
    }
}
