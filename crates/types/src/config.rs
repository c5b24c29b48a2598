//! Per-round protocol configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol parameters fixed by governance for one round.
///
/// Immutable once published; the sync layer keeps them in an append-only
/// sequence indexed by round number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundConfig {
    /// Number of chains in the DAG for this round.
    pub num_chains: u32,
    /// Agreement threshold parameter.
    pub k: u32,
    /// Total-ordering tuning ratio.
    pub phi_ratio: f32,
    /// Minimum spacing between consecutive blocks on one chain.
    pub min_block_interval: Duration,
    /// Wall-clock length of the round.
    pub round_interval: Duration,
}

impl RoundConfig {
    /// True when the fields total ordering depends on are identical, which
    /// makes two adjacent rounds safe to treat as one continuous history.
    pub fn ordering_params_match(&self, other: &Self) -> bool {
        self.k == other.k
            && self.num_chains == other.num_chains
            && self.phi_ratio.to_bits() == other.phi_ratio.to_bits()
    }
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            num_chains: 4,
            k: 0,
            phi_ratio: 0.667,
            min_block_interval: Duration::from_millis(100),
            round_interval: Duration::from_secs(60),
        }
    }
}
