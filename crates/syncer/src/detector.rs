//! Deciding when the syncer has caught up.

use crate::{state::SyncState, SyncerError, SyncerResult};
use wv_storage::BlockStore;
use wv_types::{Block, Database, Round};

#[cfg(test)]
#[path = "tests/detector_tests.rs"]
mod detector_tests;

/// The round the pending queues agree on plus its chain count.
///
/// Only meaningful after alignment succeeded, which guarantees every live
/// chain has a non-empty queue on a single round.
fn aligned_round(state: &SyncState) -> Option<(Round, u32)> {
    let head = state.pending.first().and_then(|queue| queue.first())?;
    let round = head.position.round;
    let config = state.ledger.config(round)?;
    Some((round, config.num_chains))
}

/// True when every chain of the aligned round has had a block delivered by
/// the delivery engine, i.e. the engine's state covers all chains.
pub(crate) fn chains_validated(state: &SyncState) -> bool {
    let Some((_, num_chains)) = aligned_round(state) else {
        return false;
    };
    let validated =
        state.validated.iter().filter(|chain| **chain < num_chains).count() as u32;
    validated == num_chains
}

/// True when the finalized history overlaps agreement's pending queues on
/// every chain.
///
/// Walks the finalized chain backwards from `batch_last` collecting each
/// chain's newest finalized block. A chain overlaps when that tip is not
/// older than the chain's oldest pending block; with all chains overlapping,
/// nothing can fall in the gap between the finalized past and the agreement
/// present.
pub(crate) fn tips_overlap_pending<DB: Database>(
    db: &DB,
    state: &SyncState,
    batch_last: &Block,
) -> SyncerResult<bool> {
    let Some((_, num_chains)) = aligned_round(state) else {
        return Ok(false);
    };

    let mut tips: Vec<Option<Block>> = vec![None; num_chains as usize];
    let mut tip_count: u32 = 0;
    let mut cursor = batch_last.clone();
    while tip_count < num_chains {
        let chain = cursor.position.chain;
        // Chains beyond the aligned round's width belong to an older, wider
        // setup and are not waited for.
        if chain < num_chains && tips[chain as usize].is_none() {
            tips[chain as usize] = Some(cursor.clone());
            tip_count += 1;
        }
        if cursor.finalization.parent_hash.is_zero() {
            // Some chain never finalized a block; not caught up yet.
            return Ok(false);
        }
        cursor = db
            .get_block(&cursor.finalization.parent_hash)?
            .ok_or(SyncerError::BrokenChain(cursor.finalization.parent_hash))?;
    }

    let mut overlapping: u32 = 0;
    for (chain, tip) in tips.iter().enumerate() {
        let Some(tip) = tip else { continue };
        let Some(head) = state.pending.get(chain).and_then(|queue| queue.first()) else {
            continue;
        };
        if !tip.position.older(&head.position) {
            overlapping += 1;
        }
    }
    Ok(overlapping == num_chains)
}
