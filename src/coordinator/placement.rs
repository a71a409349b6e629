//! Placement on the consistent hash ring
//!
//! Lookups take an `Arc` snapshot of the ring under a read lock and never see a
//! half-applied topology change. `add_node` builds a new ring from the current
//! one and swaps it in under the write lock.

use crate::common::{ConsistentHashRing, Error, NodeSpec, Result, VirtualNode, METRICS};
use std::sync::{Arc, RwLock};

/// PlacementManager maps keys to a coordinator and a preference list.
pub struct PlacementManager {
    ring: RwLock<Arc<ConsistentHashRing>>,
    /// Virtual nodes per unit of weight
    virtual_nodes: usize,
    /// Preference list length (N)
    replicas: usize,
}

impl PlacementManager {
    pub fn new(virtual_nodes: usize, replicas: usize) -> Self {
        Self {
            ring: RwLock::new(Arc::new(ConsistentHashRing::new(virtual_nodes))),
            virtual_nodes,
            replicas,
        }
    }

    /// Seed a ring from an ordered topology.
    pub fn with_nodes(virtual_nodes: usize, replicas: usize, nodes: &[NodeSpec]) -> Self {
        let manager = Self::new(virtual_nodes, replicas);
        for node in nodes {
            manager.add_node(&node.address, node.weight);
        }
        manager
    }

    /// Consistent view of the ring for the duration of one lookup.
    pub fn snapshot(&self) -> Arc<ConsistentHashRing> {
        self.ring
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn add_node(&self, node: &str, weight: usize) {
        let mut guard = self.ring.write().unwrap_or_else(|e| e.into_inner());
        let mut next = ConsistentHashRing::clone(&guard);
        next.add_node(node, weight);

        METRICS.ring_nodes.set(next.node_count() as u64);
        METRICS.ring_virtual_nodes.set(next.virtual_node_count() as u64);
        tracing::info!(
            node = %node,
            weight,
            virtual_nodes = self.virtual_nodes * weight,
            ring_size = next.virtual_node_count(),
            "Added node to ring"
        );

        *guard = Arc::new(next);
    }

    /// Virtual node and physical owner responsible for `key`.
    pub fn coordinator(&self, key: &str) -> Result<VirtualNode> {
        self.snapshot()
            .coordinator(key)
            .cloned()
            .ok_or_else(|| Error::Placement("no nodes available".into()))
    }

    /// Up to N distinct owners for `key`, coordinator first.
    pub fn preference_list(&self, key: &str) -> Result<Vec<String>> {
        self.preference_list_n(key, self.replicas)
    }

    pub fn preference_list_n(&self, key: &str, n: usize) -> Result<Vec<String>> {
        let list = self.snapshot().preference_list(key, n);
        if list.is_empty() {
            return Err(Error::Placement(format!(
                "no nodes available for key: {}",
                key
            )));
        }
        tracing::debug!(key = %key, preference_list = ?list, "Computed preference list");
        Ok(list)
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abc() -> PlacementManager {
        PlacementManager::with_nodes(
            3,
            3,
            &[
                NodeSpec::new("A", 1),
                NodeSpec::new("B", 1),
                NodeSpec::new("C", 1),
            ],
        )
    }

    #[test]
    fn test_empty_ring_is_placement_error() {
        let manager = PlacementManager::new(3, 3);
        assert!(matches!(
            manager.preference_list("foo"),
            Err(Error::Placement(_))
        ));
        assert!(manager.coordinator("foo").is_err());
    }

    #[test]
    fn test_preference_list_deterministic() {
        let manager = abc();
        let first = manager.preference_list("foo").unwrap();
        for _ in 0..10 {
            assert_eq!(manager.preference_list("foo").unwrap(), first);
        }
        assert_eq!(first[0], manager.coordinator("foo").unwrap().owner);
    }

    #[test]
    fn test_snapshot_unaffected_by_later_add() {
        let manager = abc();
        let before = manager.snapshot();
        manager.add_node("D", 2);
        assert_eq!(before.virtual_node_count(), 9);
        assert_eq!(manager.snapshot().virtual_node_count(), 15);
    }

    #[test]
    fn test_concurrent_lookups_during_add() {
        let manager = Arc::new(abc());
        let readers: Vec<_> = (0..4)
            .map(|i| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for j in 0..200 {
                        let ring = manager.snapshot();
                        assert!(ring.positions().windows(2).all(|w| w[0] < w[1]));
                        let list = manager.preference_list(&format!("key-{}-{}", i, j)).unwrap();
                        assert!(list.len() >= 3);
                    }
                })
            })
            .collect();

        for n in 0..20 {
            manager.add_node(&format!("extra-{}", n), 1);
        }
        for r in readers {
            r.join().unwrap();
        }
        assert_eq!(manager.snapshot().virtual_node_count(), 9 + 60);
    }
}
