// SPDX-License-Identifier: Apache-2.0

//! Bootstrap-by-sync for the Weave consensus engine.
//!
//! A node that falls behind cannot just replay agreement traffic; it has to
//! rebuild the delivery engine's state from finalized history and prove the
//! rebuilt state has caught up with the live protocol. The [`Syncer`] does
//! both: it ingests batches of finalized blocks, locates a deliver-set
//! boundary to root the delivery engine at, shadows live agreement per
//! chain, and reports synced only when the finalized past demonstrably
//! overlaps the agreement present on every chain. The result is handed off
//! as a [`SyncedConsensus`].

mod agreement;
mod aligner;
mod detector;
pub mod error;
mod fabric;
mod handoff;
mod ledger;
mod locator;
mod network;
mod state;
mod syncer;
mod verifier;

pub use error::{SyncerError, SyncerResult};
pub use handoff::SyncedConsensus;
pub use network::{NetworkCommand, NetworkHandle, SyncNetwork};
pub use syncer::Syncer;
pub use verifier::{ThresholdVerifier, TsigVerifierCache};
