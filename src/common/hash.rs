//! Hashing and the consistent hash ring
//!
//! - BLAKE3 truncated to 32 bits for ring coordinates
//! - Virtual nodes: each physical node owns `replicas × weight` positions
//! - Clockwise walk for coordinator and preference-list selection

use std::collections::{HashMap, HashSet};

/// Map a string onto the 32-bit ring (first four bytes of BLAKE3, big-endian).
pub fn ring_position(s: &str) -> u32 {
    let hash = blake3::hash(s.as_bytes());
    let b = hash.as_bytes();
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

/// Label of the `i`-th virtual node of `node`. This is also the string that gets hashed.
pub fn vnode_label(node: &str, i: usize) -> String {
    format!("{}#{}", node, i)
}

/// One position on the ring owned by a physical node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNode {
    pub position: u32,
    pub owner: String,
    pub label: String,
}

/// Consistent hash ring with virtual nodes.
///
/// `positions` is always sorted and every entry has exactly one owner in `vnodes`.
/// Two virtual nodes landing on the same coordinate resolve last-write-wins.
#[derive(Debug, Clone, Default)]
pub struct ConsistentHashRing {
    /// Virtual nodes per unit of weight
    replicas: usize,
    positions: Vec<u32>,
    vnodes: HashMap<u32, VirtualNode>,
}

impl ConsistentHashRing {
    pub fn new(replicas: usize) -> Self {
        Self {
            replicas,
            positions: Vec::new(),
            vnodes: HashMap::new(),
        }
    }

    /// Insert `replicas × weight` virtual nodes for `node`. Re-adding overwrites.
    pub fn add_node(&mut self, node: &str, weight: usize) {
        for i in 0..self.replicas * weight {
            let label = vnode_label(node, i);
            let position = ring_position(&label);

            if let Err(idx) = self.positions.binary_search(&position) {
                self.positions.insert(idx, position);
            }
            self.vnodes.insert(
                position,
                VirtualNode {
                    position,
                    owner: node.to_string(),
                    label,
                },
            );
        }
    }

    /// Index of the first virtual node at or after the key's coordinate, wrapping to 0.
    fn start_index(&self, key: &str) -> Option<usize> {
        if self.positions.is_empty() {
            return None;
        }
        let h = ring_position(key);
        let idx = self.positions.partition_point(|&p| p < h);
        Some(if idx == self.positions.len() { 0 } else { idx })
    }

    /// Virtual node responsible for `key`, or `None` on an empty ring.
    pub fn coordinator(&self, key: &str) -> Option<&VirtualNode> {
        let idx = self.start_index(key)?;
        self.vnodes.get(&self.positions[idx])
    }

    /// Up to `n` distinct physical nodes, clockwise from the key's position.
    pub fn preference_list(&self, key: &str, n: usize) -> Vec<String> {
        let start = match self.start_index(key) {
            Some(idx) if n > 0 => idx,
            _ => return Vec::new(),
        };

        let distinct = self.node_count();
        let mut seen = HashSet::new();
        let mut list = Vec::with_capacity(n.min(distinct));

        for step in 0..self.positions.len() {
            if list.len() == n || list.len() == distinct {
                break;
            }
            let pos = self.positions[(start + step) % self.positions.len()];
            if let Some(vnode) = self.vnodes.get(&pos) {
                if seen.insert(vnode.owner.as_str()) {
                    list.push(vnode.owner.clone());
                }
            }
        }

        list
    }

    /// Sorted ring coordinates
    pub fn positions(&self) -> &[u32] {
        &self.positions
    }

    pub fn virtual_node_count(&self) -> usize {
        self.positions.len()
    }

    /// Distinct physical nodes, sorted
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self
            .vnodes
            .values()
            .map(|v| v.owner.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        nodes.sort();
        nodes
    }

    pub fn node_count(&self) -> usize {
        self.vnodes
            .values()
            .map(|v| v.owner.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
