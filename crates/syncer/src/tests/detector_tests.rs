//! Sync completion detection tests.

use super::{chains_validated, tips_overlap_pending};
use crate::{ledger::ConfigLedger, state::SyncState, SyncerError};
use assert_matches::assert_matches;
use wv_storage::{mem_db::MemDatabase, BlockStore};
use wv_test_utils::ChainFixture;
use wv_types::{Block, BlockHash, ChainId, Height, Position, Round, RoundConfig};

fn state_for(num_chains: u32) -> SyncState {
    let config = RoundConfig { num_chains, ..RoundConfig::default() };
    let mut state = SyncState::new(ConfigLedger::new(0, config));
    state.pending = vec![Vec::new(); num_chains as usize];
    state
}

/// A pending-queue head at `position`, hash keyed by chain.
fn head(round: Round, chain: ChainId, height: Height) -> Block {
    Block {
        hash: BlockHash::from_low_u64_be(900 + chain as u64),
        position: Position::new(round, chain, height),
        ..Default::default()
    }
}

#[test]
fn validation_needs_every_chain_of_the_aligned_round() {
    let mut state = state_for(2);
    state.pending[0].push(head(0, 0, 1));

    assert!(!chains_validated(&state));
    state.validated.insert(0);
    assert!(!chains_validated(&state));
    // Chains outside the round's width do not count.
    state.validated.insert(7);
    assert!(!chains_validated(&state));
    state.validated.insert(1);
    assert!(chains_validated(&state));
}

#[test]
fn nothing_is_decided_without_an_aligned_queue() {
    let db = MemDatabase::default();
    let mut state = state_for(2);
    state.validated.extend([0, 1]);

    // Chain 0 has nothing pending, so there is no aligned round to check.
    assert!(!chains_validated(&state));
    assert!(!tips_overlap_pending(&db, &state, &Block::default()).expect("no walk happens"));

    // A head on a round the ledger does not know is just as undecidable.
    state.pending[0].push(head(5, 0, 1));
    assert!(!chains_validated(&state));
}

#[test]
fn overlap_needs_every_tip_at_or_past_its_queue_head() {
    let fixture =
        ChainFixture::builder(2).deliver_set(0, &[0, 1]).deliver_set(0, &[0, 1]).build();
    let db = MemDatabase::default();
    fixture.seed(&db);

    // Tips sit at height 1 on both chains.
    let mut state = state_for(2);
    state.pending[0].push(head(0, 0, 1));
    state.pending[1].push(head(0, 1, 1));
    assert!(tips_overlap_pending(&db, &state, fixture.last()).expect("history complete"));

    // A queue ahead of its tip leaves a gap.
    state.pending[1][0] = head(0, 1, 2);
    assert!(!tips_overlap_pending(&db, &state, fixture.last()).expect("history complete"));
}

#[test]
fn a_chain_with_no_finalized_blocks_cannot_overlap() {
    // Chain 1 never finalized anything.
    let fixture = ChainFixture::builder(2).deliver_set(0, &[0]).deliver_set(0, &[0]).build();
    let db = MemDatabase::default();
    fixture.seed(&db);

    let mut state = state_for(2);
    state.pending[0].push(head(0, 0, 0));
    state.pending[1].push(head(0, 1, 0));
    assert!(!tips_overlap_pending(&db, &state, fixture.last()).expect("walk to genesis"));
}

#[test]
fn history_chains_outside_the_round_width_are_skipped() {
    // Chain 7 belongs to an older, wider setup; it must neither become a
    // tip nor be waited for.
    let fixture = ChainFixture::builder(8)
        .deliver_set(0, &[0, 1])
        .deliver_set(0, &[0, 1, 7])
        .build();
    let db = MemDatabase::default();
    fixture.seed(&db);

    let mut state = state_for(2);
    state.pending[0].push(head(0, 0, 1));
    state.pending[1].push(head(0, 1, 1));
    assert!(tips_overlap_pending(&db, &state, fixture.last()).expect("history complete"));
}

#[test]
fn a_missing_finalization_parent_is_a_broken_chain() {
    let fixture = ChainFixture::builder(2).deliver_set(0, &[0, 1]).build();
    let db = MemDatabase::default();
    let last = fixture.last().clone();
    db.seed_finalized_chain_for_test(&[last.clone()]);

    let mut state = state_for(2);
    state.pending[0].push(head(0, 0, 0));
    state.pending[1].push(head(0, 1, 0));

    let err = tips_overlap_pending(&db, &state, &last).expect_err("parent not stored");
    assert_matches!(err, SyncerError::BrokenChain(hash) if hash == fixture.blocks()[0].hash);
    assert!(err.is_fatal());
}
