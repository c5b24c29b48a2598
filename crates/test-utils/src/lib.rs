// SPDX-License-Identifier: Apache-2.0

//! Fixtures and mock collaborators for sync-layer tests.

#![warn(unused_crate_dependencies)]

mod chain;
pub use chain::*;
mod governance;
pub use governance::*;
mod lattice;
pub use lattice::*;

use std::time::Duration;
use wv_config::{SyncerConfig, SyncerParameters};
use wv_types::{BlsKeypair, Database, Governance, TimestampMs};

/// Initialize tracing for a test binary. Safe to call from every test; only
/// the first call installs the subscriber.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Syncer parameters with timers tightened so polling loops fire within a
/// test's patience.
pub fn fast_parameters() -> SyncerParameters {
    SyncerParameters {
        crs_poll_interval: Duration::from_millis(20),
        notify_timeout: Duration::from_millis(25),
        ..SyncerParameters::default()
    }
}

/// A syncer config wired for tests: fast timers, genesis at `genesis_time`.
pub fn test_syncer_config<DB: Database, G: Governance>(
    db: DB,
    governance: G,
    genesis_time: TimestampMs,
) -> SyncerConfig<DB, G> {
    SyncerConfig::new(db, governance, fast_parameters(), genesis_time)
}

/// A fresh random BLS keypair.
pub fn random_keypair() -> BlsKeypair {
    BlsKeypair::generate(&mut rand::rng())
}
