//! Versioned records and the wire payloads that carry them

use crate::common::VectorClock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One immutable version of a key's value.
///
/// Equality ignores `origin_node`: two copies of the same write read back from
/// different replicas are the same version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionedRecord {
    pub value: String,
    pub vector_clock: VectorClock,
    pub created_at: DateTime<Utc>,
    /// Replica this copy was read from, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_node: Option<String>,
}

impl VersionedRecord {
    pub fn new(value: impl Into<String>, vector_clock: VectorClock) -> Self {
        Self {
            value: value.into(),
            vector_clock,
            created_at: Utc::now(),
            origin_node: None,
        }
    }

    pub fn with_origin(mut self, node: impl Into<String>) -> Self {
        self.origin_node = Some(node.into());
        self
    }

    fn identity(&self) -> (&str, &VectorClock, &DateTime<Utc>) {
        (&self.value, &self.vector_clock, &self.created_at)
    }
}

impl PartialEq for VersionedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Eq for VersionedRecord {}

/// Payload of a replica or cache write: `{key, value, vectorClock}`.
///
/// `createdAt` is optional; when present the receiver keeps it so that every
/// replica holds an identical copy of the version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub vector_clock: VectorClock,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WriteRequest {
    pub fn for_version(key: &str, version: &VersionedRecord) -> Self {
        Self {
            key: key.to_string(),
            value: version.value.clone(),
            vector_clock: version.vector_clock.clone(),
            created_at: Some(version.created_at),
        }
    }

    /// The version this request asks the receiver to append.
    pub fn into_version(self) -> VersionedRecord {
        VersionedRecord {
            value: self.value,
            vector_clock: self.vector_clock,
            created_at: self.created_at.unwrap_or_else(Utc::now),
            origin_node: None,
        }
    }
}

/// Drop exact duplicates, keeping first-seen order.
///
/// When duplicates disagree on provenance the copy that names its origin node wins.
pub fn dedup_versions(versions: Vec<VersionedRecord>) -> Vec<VersionedRecord> {
    let mut out: Vec<VersionedRecord> = Vec::with_capacity(versions.len());
    let mut index: HashMap<(String, VectorClock, DateTime<Utc>), usize> = HashMap::new();

    for version in versions {
        let id = (
            version.value.clone(),
            version.vector_clock.clone(),
            version.created_at,
        );
        match index.get(&id) {
            Some(&i) => {
                if out[i].origin_node.is_none() && version.origin_node.is_some() {
                    out[i] = version;
                }
            }
            None => {
                index.insert(id, out.len());
                out.push(version);
            }
        }
    }

    out
}

/// Pointwise merge of every clock in `versions`.
pub fn merged_clock<'a>(versions: impl IntoIterator<Item = &'a VersionedRecord>) -> VectorClock {
    versions
        .into_iter()
        .fold(VectorClock::new(), |acc, v| acc.merge(&v.vector_clock))
}
