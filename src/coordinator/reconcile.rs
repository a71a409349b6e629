//! What a read hands back when a key holds several versions

use crate::common::{ReconcileMode, VersionedRecord};
use std::sync::Arc;

pub trait Reconciler: Send + Sync {
    fn reconcile(&self, versions: Vec<VersionedRecord>) -> Vec<VersionedRecord>;
}

/// Return every version, the full write history included.
pub struct KeepAllVersions;

impl Reconciler for KeepAllVersions {
    fn reconcile(&self, versions: Vec<VersionedRecord>) -> Vec<VersionedRecord> {
        versions
    }
}

/// Drop versions whose clock another returned version dominates; siblings survive.
pub struct PruneDominated;

impl Reconciler for PruneDominated {
    fn reconcile(&self, versions: Vec<VersionedRecord>) -> Vec<VersionedRecord> {
        versions
            .iter()
            .filter(|v| {
                !versions
                    .iter()
                    .any(|other| other.vector_clock.dominates(&v.vector_clock))
            })
            .cloned()
            .collect()
    }
}

pub fn reconciler_for(mode: ReconcileMode) -> Arc<dyn Reconciler> {
    match mode {
        ReconcileMode::KeepAll => Arc::new(KeepAllVersions),
        ReconcileMode::PruneDominated => Arc::new(PruneDominated),
    }
}
