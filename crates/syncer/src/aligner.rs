//! Aligning the per-chain pending queues onto one agreement round.

use crate::{
    error::{SyncerError, SyncerResult},
    state::SyncState,
};
use std::{collections::HashMap, time::Duration};
use tracing::{debug, info};
use wv_types::{Block, Round, TimestampMs};

#[cfg(test)]
#[path = "tests/aligner_tests.rs"]
mod aligner_tests;

/// Try to bring every chain's pending queue onto a single round, the
/// "agreement cut". Once found, the cut is final: blocks confirmed for
/// earlier rounds are discarded at the door.
///
/// Returns true when the queues agree on one round and every chain of that
/// round's configuration has at least one block queued. Confirmed blocks only
/// exist for rounds the ledger already covers, so a queued round with no
/// configuration is fatal.
pub(crate) fn ensure_overlap_round(state: &mut SyncState) -> SyncerResult<bool> {
    if state.agreement_cut > 0 {
        return Ok(true);
    }
    let SyncState { pending, ledger, agreement_cut, .. } = state;

    // Empty placeholders stranded at a queue's head have no predecessor to
    // rebuild them from; drop them.
    for queue in pending.iter_mut() {
        let stranded = queue.iter().take_while(|block| block.is_empty()).count();
        queue.drain(..stranded);
    }

    // Rebuild the placeholders that sit directly on a queued predecessor.
    for queue in pending.iter_mut() {
        for i in 1..queue.len() {
            if queue[i].is_empty()
                && queue[i - 1].position.height + 1 == queue[i].position.height
            {
                let round = queue[i].position.round;
                let config = ledger.config(round).ok_or(SyncerError::MissingConfig(round))?;
                let min_interval = config.min_block_interval;
                let (settled, rest) = queue.split_at_mut(i);
                build_empty_block(&mut rest[0], &settled[i - 1], min_interval);
            }
        }
    }

    // Queues may sit on different rounds; repeatedly discard heads below the
    // newest tip round until a single round remains.
    let tip_rounds = loop {
        let mut tip_rounds: HashMap<Round, u32> = HashMap::new();
        for queue in pending.iter() {
            if let Some(head) = queue.first() {
                *tip_rounds.entry(head.position.round).or_default() += 1;
            }
        }
        if tip_rounds.len() <= 1 {
            break tip_rounds;
        }
        let newest = tip_rounds.keys().copied().max().unwrap_or(0);
        for queue in pending.iter_mut() {
            let stale = queue.iter().take_while(|b| b.position.round < newest).count();
            queue.drain(..stale);
        }
    };

    if let Some((&round, &chains_on_round)) = tip_rounds.iter().next() {
        debug!(target: "syncer", round, chains_on_round, "checking agreement round cut");
        let config = ledger.config(round).ok_or(SyncerError::MissingConfig(round))?;
        if chains_on_round == config.num_chains {
            *agreement_cut = round;
            info!(target: "syncer", round, "agreement round cut found");
            return Ok(true);
        }
    }
    Ok(false)
}

/// Fill in the fields of an empty placeholder from the block below it.
fn build_empty_block(block: &mut Block, parent: &Block, min_block_interval: Duration) {
    block.timestamp = parent.timestamp + min_block_interval.as_millis() as TimestampMs;
    block.witness.height = parent.witness.height;
    block.witness.data = parent.witness.data.clone();
    block.acks = vec![parent.hash];
}
