//! The bundle of collaborators and parameters a syncer runs with.

use crate::SyncerParameters;
use std::sync::Arc;
use wv_types::{Database, Governance, Notifier, TimestampMs};

struct Inner<DB, G> {
    db: DB,
    governance: G,
    parameters: SyncerParameters,
    genesis_time: TimestampMs,
    shutdown: Notifier,
}

/// Everything a syncer needs from its node: storage, governance, parameters,
/// the network's launch instant, and the node-level shutdown signal.
///
/// Cheap to clone; all clones share one inner allocation.
pub struct SyncerConfig<DB, G> {
    inner: Arc<Inner<DB, G>>,
}

impl<DB, G> Clone for SyncerConfig<DB, G> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<DB: Database, G: Governance> SyncerConfig<DB, G> {
    pub fn new(
        db: DB,
        governance: G,
        parameters: SyncerParameters,
        genesis_time: TimestampMs,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                governance,
                parameters,
                genesis_time,
                shutdown: Notifier::new(),
            }),
        }
    }

    pub fn db(&self) -> &DB {
        &self.inner.db
    }

    pub fn governance(&self) -> &G {
        &self.inner.governance
    }

    pub fn parameters(&self) -> &SyncerParameters {
        &self.inner.parameters
    }

    /// The instant round 0 began.
    pub fn genesis_time(&self) -> TimestampMs {
        self.inner.genesis_time
    }

    /// Node-level shutdown signal. Firing it winds down the live loops; it
    /// does not replace an orderly `stop()`.
    pub fn shutdown(&self) -> &Notifier {
        &self.inner.shutdown
    }
}
