//! Tunable parameters of the sync layer.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Operational knobs for the sync layer. Every field has a default good for
/// mainnet-shaped deployments; deserialization accepts human-readable
/// durations ("500ms", "2s").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerParameters {
    /// How many rounds of configuration to fetch ahead of the highest round
    /// seen. Governance publishes configs ahead of the rounds that need
    /// them, so the ledger keeps this much slack.
    pub config_round_shift: u64,

    /// Polling cadence for common-random-seed availability.
    #[serde(with = "humantime_serde")]
    pub crs_poll_interval: Duration,

    /// How long a round-ready notification may wait on one agreement
    /// worker's channel before the send is retried with a warning.
    #[serde(with = "humantime_serde")]
    pub notify_timeout: Duration,

    /// Capacity of the confirmed-block, pull, and worker input channels.
    pub channel_capacity: usize,

    /// Soft high-water mark for one chain's pending queue. Crossing it only
    /// logs; dropping blocks could discard the very overlap sync detection
    /// waits for.
    pub pending_queue_warn: usize,

    /// How many rounds of threshold verifiers to keep cached.
    pub tsig_cache_rounds: usize,
}

impl Default for SyncerParameters {
    fn default() -> Self {
        Self {
            config_round_shift: 2,
            crs_poll_interval: Duration::from_millis(500),
            notify_timeout: Duration::from_millis(500),
            channel_capacity: 1_000,
            pending_queue_warn: 16_384,
            tsig_cache_rounds: 7,
        }
    }
}
