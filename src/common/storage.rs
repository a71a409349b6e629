/// Durable version storage for ringkv
///
/// Every write appends a version; nothing is overwritten. Supports an in-memory
/// backend (default, also used by storage nodes) and Sled.
use crate::common::{Error, Result, VectorClock, VersionedRecord};
use std::collections::HashMap;
use std::sync::RwLock;

#[cfg(feature = "sled-backend")]
use std::path::Path;

/// Trait for version storage backends
pub trait Store: Send + Sync {
    /// Append an already-built version. Provenance is not persisted.
    fn append(&self, key: &str, version: VersionedRecord) -> Result<()>;

    /// Append unless an equal version is already held. The check and the
    /// append are atomic; returns whether the version was stored.
    fn append_if_absent(&self, key: &str, version: VersionedRecord) -> Result<bool>;

    /// Every version held for `key`, oldest first, or `NotFound`.
    fn get_all_versions(&self, key: &str) -> Result<Vec<VersionedRecord>>;

    fn get_all_keys(&self) -> Result<Vec<String>>;

    fn delete_all_versions(&self, key: &str) -> Result<()>;

    /// Create a new version stamped now and append it.
    fn put_version(&self, key: &str, value: &str, clock: VectorClock) -> Result<VersionedRecord> {
        let version = VersionedRecord::new(value, clock);
        self.append(key, version.clone())?;
        Ok(version)
    }
}

fn sort_oldest_first(versions: &mut [VersionedRecord]) {
    versions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// In-memory store (default)
#[derive(Default)]
pub struct MemStore {
    map: RwLock<HashMap<String, Vec<VersionedRecord>>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Storage("store lock poisoned".into())
}

impl Store for MemStore {
    fn append(&self, key: &str, mut version: VersionedRecord) -> Result<()> {
        version.origin_node = None;
        let mut map = self.map.write().map_err(poisoned)?;
        map.entry(key.to_string()).or_default().push(version);
        Ok(())
    }

    fn append_if_absent(&self, key: &str, mut version: VersionedRecord) -> Result<bool> {
        version.origin_node = None;
        let mut map = self.map.write().map_err(poisoned)?;
        let versions = map.entry(key.to_string()).or_default();
        if versions.contains(&version) {
            return Ok(false);
        }
        versions.push(version);
        Ok(true)
    }

    fn get_all_versions(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        let map = self.map.read().map_err(poisoned)?;
        match map.get(key) {
            Some(versions) if !versions.is_empty() => {
                let mut out = versions.clone();
                sort_oldest_first(&mut out);
                Ok(out)
            }
            _ => Err(Error::NotFound(key.to_string())),
        }
    }

    fn get_all_keys(&self) -> Result<Vec<String>> {
        let map = self.map.read().map_err(poisoned)?;
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn delete_all_versions(&self, key: &str) -> Result<()> {
        self.map.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Sled store
///
/// Versions live under `key \0 id` where `id` is a big-endian monotonic sled id,
/// so a prefix scan yields insertion order.
#[cfg(feature = "sled-backend")]
pub struct SledStore {
    db: sled::Db,
    // Serializes check-then-append; a prefix scan cannot run inside a sled transaction
    dedup: std::sync::Mutex<()>,
}

#[cfg(feature = "sled-backend")]
const KEY_SEP: u8 = 0;

#[cfg(feature = "sled-backend")]
fn sled_err(e: sled::Error) -> Error {
    Error::Storage(e.to_string())
}

#[cfg(feature = "sled-backend")]
impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(sled_err)?;
        Ok(Self {
            db,
            dedup: std::sync::Mutex::new(()),
        })
    }

    fn prefix(key: &str) -> Vec<u8> {
        let mut prefix = key.as_bytes().to_vec();
        prefix.push(KEY_SEP);
        prefix
    }
}

#[cfg(feature = "sled-backend")]
impl Store for SledStore {
    fn append(&self, key: &str, mut version: VersionedRecord) -> Result<()> {
        version.origin_node = None;
        let id = self.db.generate_id().map_err(sled_err)?;
        let mut db_key = Self::prefix(key);
        db_key.extend_from_slice(&id.to_be_bytes());
        let value = serde_json::to_vec(&version)
            .map_err(|e| Error::Internal(format!("Serialize error: {}", e)))?;
        self.db.insert(db_key, value).map_err(sled_err)?;
        Ok(())
    }

    fn append_if_absent(&self, key: &str, version: VersionedRecord) -> Result<bool> {
        let _guard = self.dedup.lock().map_err(poisoned)?;
        match self.get_all_versions(key) {
            Ok(existing) if existing.contains(&version) => return Ok(false),
            Ok(_) | Err(Error::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.append(key, version)?;
        Ok(true)
    }

    fn get_all_versions(&self, key: &str) -> Result<Vec<VersionedRecord>> {
        let mut out = Vec::new();
        for item in self.db.scan_prefix(Self::prefix(key)) {
            let (_, bytes) = item.map_err(sled_err)?;
            let version: VersionedRecord = serde_json::from_slice(&bytes)
                .map_err(|e| Error::Storage(format!("corrupted version for {}: {}", key, e)))?;
            out.push(version);
        }
        if out.is_empty() {
            return Err(Error::NotFound(key.to_string()));
        }
        sort_oldest_first(&mut out);
        Ok(out)
    }

    fn get_all_keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.db.iter().keys() {
            let db_key = item.map_err(sled_err)?;
            let Some(end) = db_key.iter().position(|&b| b == KEY_SEP) else {
                continue;
            };
            let key = String::from_utf8(db_key[..end].to_vec())
                .map_err(|_| Error::Storage("Invalid UTF-8 key".into()))?;
            if keys.last() != Some(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    fn delete_all_versions(&self, key: &str) -> Result<()> {
        let mut batch = sled::Batch::default();
        for item in self.db.scan_prefix(Self::prefix(key)).keys() {
            batch.remove(item.map_err(sled_err)?);
        }
        self.db.apply_batch(batch).map_err(sled_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(node: &str, n: u64) -> VectorClock {
        [(node, n)].into_iter().collect()
    }

    #[test]
    fn test_versions_accumulate() {
        let store = MemStore::new();
        store.put_version("foo", "v1", clock("A", 1)).unwrap();
        store.put_version("foo", "v2", clock("A", 2)).unwrap();

        let versions = store.get_all_versions("foo").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].value, "v1");
        assert_eq!(versions[1].value, "v2");
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let store = MemStore::new();
        assert!(matches!(
            store.get_all_versions("nope"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_provenance_not_persisted() {
        let store = MemStore::new();
        let rec = VersionedRecord::new("v", clock("A", 1)).with_origin("node-a");
        store.append("foo", rec).unwrap();
        assert!(store.get_all_versions("foo").unwrap()[0].origin_node.is_none());
    }

    #[test]
    fn test_keys_and_delete() {
        let store = MemStore::new();
        store.put_version("b", "1", clock("A", 1)).unwrap();
        store.put_version("a", "1", clock("A", 1)).unwrap();
        assert_eq!(store.get_all_keys().unwrap(), vec!["a", "b"]);

        store.delete_all_versions("a").unwrap();
        assert_eq!(store.get_all_keys().unwrap(), vec!["b"]);
        assert!(store.get_all_versions("a").is_err());
    }

    #[test]
    fn test_append_if_absent_skips_equal_version() {
        let store = MemStore::new();
        let version = VersionedRecord::new("v", clock("A", 1));
        assert!(store.append_if_absent("foo", version.clone()).unwrap());
        assert!(!store
            .append_if_absent("foo", version.clone().with_origin("node-b"))
            .unwrap());
        assert_eq!(store.get_all_versions("foo").unwrap(), vec![version]);
    }

    #[test]
    fn test_concurrent_append_if_absent_stores_once() {
        let store = std::sync::Arc::new(MemStore::new());
        let version = VersionedRecord::new("v", clock("A", 1));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                let version = version.clone();
                std::thread::spawn(move || store.append_if_absent("foo", version).unwrap())
            })
            .collect();
        let stored = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|stored| *stored)
            .count();
        assert_eq!(stored, 1);
        assert_eq!(store.get_all_versions("foo").unwrap().len(), 1);
    }

    #[cfg(feature = "sled-backend")]
    #[test]
    fn test_sled_store_roundtrip() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SledStore::open(dir.path().join("db")).unwrap();
        store.put_version("foo", "v1", clock("A", 1)).unwrap();
        store.put_version("foo", "v2", clock("A", 2)).unwrap();
        store.put_version("foobar", "x", clock("B", 1)).unwrap();

        let versions = store.get_all_versions("foo").unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(store.get_all_keys().unwrap(), vec!["foo", "foobar"]);

        store.delete_all_versions("foo").unwrap();
        assert!(store.get_all_versions("foo").is_err());
        assert_eq!(store.get_all_versions("foobar").unwrap().len(), 1);

        let version = VersionedRecord::new("x", clock("C", 1));
        assert!(store.append_if_absent("dup", version.clone()).unwrap());
        assert!(!store.append_if_absent("dup", version).unwrap());
        assert_eq!(store.get_all_versions("dup").unwrap().len(), 1);
    }
}
