//! Vector clocks for tracking causality between writes to the same key

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Node id → counter. Counters only ever grow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock(BTreeMap<String, u64>);

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: BTreeMap<String, u64>) -> Self {
        Self(map)
    }

    pub fn into_map(self) -> BTreeMap<String, u64> {
        self.0
    }

    /// Counter for `node`, 0 when absent.
    pub fn get(&self, node: &str) -> u64 {
        self.0.get(node).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &u64)> {
        self.0.iter()
    }

    /// Pointwise maximum of both clocks.
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut merged = self.0.clone();
        for (node, &counter) in &other.0 {
            let entry = merged.entry(node.clone()).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
        VectorClock(merged)
    }

    /// Copy of this clock with `node`'s counter bumped by one.
    pub fn advance(&self, node: &str) -> VectorClock {
        let mut next = self.0.clone();
        *next.entry(node.to_string()).or_insert(0) += 1;
        VectorClock(next)
    }

    /// True iff every counter here is ≥ the other's and the clocks differ.
    pub fn dominates(&self, other: &VectorClock) -> bool {
        self != other
            && other
                .0
                .iter()
                .all(|(node, &counter)| self.get(node) >= counter)
    }

    /// Neither clock has seen the other's history.
    pub fn concurrent(&self, other: &VectorClock) -> bool {
        self != other && !self.dominates(other) && !other.dominates(self)
    }
}

impl<S: Into<String>> FromIterator<(S, u64)> for VectorClock {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        VectorClock(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
