//! Round-indexed configuration ledger.

use crate::{SyncerError, SyncerResult};
use tracing::debug;
use wv_types::{Governance, Round, RoundConfig, TimestampMs};

/// Append-only sequence of per-round configurations and round begin times.
///
/// Round 0 is fixed at construction. Later rounds are pulled from governance
/// in order; round `r + 1` begins when round `r`'s interval elapses, so begin
/// times are derived, not published.
pub(crate) struct ConfigLedger {
    configs: Vec<RoundConfig>,
    begin_times: Vec<TimestampMs>,
}

impl ConfigLedger {
    pub(crate) fn new(genesis_time: TimestampMs, genesis_config: RoundConfig) -> Self {
        Self { configs: vec![genesis_config], begin_times: vec![genesis_time] }
    }

    /// Number of rounds with a known configuration. Also the next round to
    /// fetch.
    pub(crate) fn rounds(&self) -> Round {
        self.configs.len() as Round
    }

    pub(crate) fn config(&self, round: Round) -> Option<&RoundConfig> {
        self.configs.get(round as usize)
    }

    pub(crate) fn begin_time(&self, round: Round) -> Option<TimestampMs> {
        self.begin_times.get(round as usize).copied()
    }

    /// Fetch configurations through `round` from governance. Returns the
    /// widest `num_chains` among the rounds appended by this call, 0 when
    /// everything was already known.
    pub(crate) fn extend_to<G: Governance>(
        &mut self,
        governance: &G,
        round: Round,
    ) -> SyncerResult<u32> {
        let mut new_max_chains = 0;
        for r in self.rounds()..=round {
            let config = governance.round_config(r).ok_or(SyncerError::MissingConfig(r))?;
            let prev_begin = self.begin_times[(r - 1) as usize];
            let prev_interval = self.configs[(r - 1) as usize].round_interval;
            self.begin_times.push(prev_begin + prev_interval.as_millis() as TimestampMs);
            new_max_chains = new_max_chains.max(config.num_chains);
            self.configs.push(config);
            debug!(target: "syncer", round = r, "round configuration appended");
        }
        Ok(new_max_chains)
    }
}
