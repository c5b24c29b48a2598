//! Locating the delivery-engine bootstrap block on the finalized chain.

use crate::{ledger::ConfigLedger, SyncerError, SyncerResult};
use tracing::trace;
use wv_storage::BlockStore;
use wv_types::{Block, BlockHash, Database};

#[cfg(test)]
#[path = "tests/locator_tests.rs"]
mod locator_tests;

/// Find a block the delivery engine can be rebuilt from, walking the
/// finalized chain backwards from `batch_last`.
///
/// A usable boundary is the first block of a complete deliver set: total
/// ordering emits each set in ascending hash order, so a block whose hash is
/// not above its finalization parent's starts a new set. The search only
/// trusts sets that sit inside a stretch of rounds with identical ordering
/// parameters, since a parameter change re-cuts set boundaries.
///
/// Returns `Ok(None)` when no round qualifies, [`SyncerError::GenesisReached`]
/// when the walk runs out of stored history before settling.
pub(crate) fn find_sync_boundary<DB: Database>(
    db: &DB,
    ledger: &ConfigLedger,
    batch_last: &Block,
) -> SyncerResult<Option<Block>> {
    let mut newest = batch_last.clone();
    let mut round = newest.position.round;
    loop {
        // Settle on a round whose ordering parameters match both neighbors.
        loop {
            let matches_prev = round == 0 || ordering_stable(ledger, round - 1, round)?;
            let matches_next = ordering_stable(ledger, round, round + 1)?;
            if matches_prev && matches_next {
                break;
            }
            if round == 0 {
                return Ok(None);
            }
            round -= 1;
        }
        trace!(target: "syncer", round, "searching for a deliver set boundary");

        // Rewind to the newest finalized block of that round.
        while newest.position.round != round {
            if newest.finalization.parent_hash.is_zero() {
                return Err(SyncerError::GenesisReached);
            }
            newest = fetch(db, newest.finalization.parent_hash)?;
        }

        // Walk down while hashes descend; the first non-descending step is
        // the last block of the previous deliver set.
        let mut cursor = newest.clone();
        let set_last;
        loop {
            if cursor.finalization.parent_hash.is_zero() {
                return Err(SyncerError::GenesisReached);
            }
            let parent = fetch(db, cursor.finalization.parent_hash)?;
            if parent.hash >= cursor.hash {
                set_last = parent;
                break;
            }
            cursor = parent;
        }

        // Same walk again to find where that set begins. Hitting genesis
        // here just means the set starts at the chain's first block.
        let mut cursor = set_last.clone();
        loop {
            if cursor.finalization.parent_hash.is_zero() {
                break;
            }
            let parent = fetch(db, cursor.finalization.parent_hash)?;
            if parent.hash >= cursor.hash {
                break;
            }
            cursor = parent;
        }
        let set_first = cursor;

        // The set only counts if every block in it belongs to the settled
        // round.
        let mut whole_set_in_round = true;
        let mut cursor = set_last.clone();
        loop {
            if cursor.position.round != round {
                whole_set_in_round = false;
                break;
            }
            cursor = fetch(db, cursor.finalization.parent_hash)?;
            if cursor.hash == set_first.hash {
                break;
            }
        }
        if whole_set_in_round {
            return Ok(Some(set_first));
        }
        if round == 0 {
            return Ok(None);
        }
        round -= 1;
    }
}

/// True when rounds `a` and `b` share the parameters total ordering depends
/// on.
fn ordering_stable(ledger: &ConfigLedger, a: u64, b: u64) -> SyncerResult<bool> {
    let config_a = ledger.config(a).ok_or(SyncerError::MissingConfig(a))?;
    let config_b = ledger.config(b).ok_or(SyncerError::MissingConfig(b))?;
    Ok(config_a.ordering_params_match(config_b))
}

fn fetch<DB: Database>(db: &DB, hash: BlockHash) -> SyncerResult<Block> {
    db.get_block(&hash)?.ok_or(SyncerError::BrokenChain(hash))
}
