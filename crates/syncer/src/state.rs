//! Shared mutable state of a running syncer.

use crate::{agreement::AgreementInput, ledger::ConfigLedger};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::mpsc;
use wv_types::{Block, BlockHash, ChainId, RandomnessResult, Round};

/// Everything behind the syncer's single state lock.
///
/// One lock keeps the invariants between these fields simple: whoever holds
/// it sees pending queues, the ledger, and the agreement cut move together.
/// It is never held across an await point. The delivery engine lives behind
/// its own lock on the syncer, always taken inside this one.
pub(crate) struct SyncState {
    /// Per-round configurations and begin times.
    pub(crate) ledger: ConfigLedger,
    /// Highest round the delivery engine has a configuration for.
    pub(crate) lattice_round: Round,
    /// Per-chain queues of agreement-confirmed blocks, kept age-sorted.
    pub(crate) pending: Vec<Vec<Block>>,
    /// Input sides of the per-chain agreement workers.
    pub(crate) workers: Vec<mpsc::Sender<AgreementInput>>,
    /// Chains that have had at least one block delivered by the engine.
    pub(crate) validated: HashSet<ChainId>,
    /// Finalization order not yet matched against delivery order.
    pub(crate) finalized: VecDeque<BlockHash>,
    /// Verified randomness, keyed by the block it signs.
    pub(crate) randomness: HashMap<BlockHash, RandomnessResult>,
    /// Round the pending queues were aligned to; 0 means not aligned yet.
    pub(crate) agreement_cut: Round,
    /// Set once sync completes; the handoff block.
    pub(crate) synced_last_block: Option<Block>,
}

impl SyncState {
    pub(crate) fn new(ledger: ConfigLedger) -> Self {
        Self {
            ledger,
            lattice_round: 0,
            pending: Vec::new(),
            workers: Vec::new(),
            validated: HashSet::new(),
            finalized: VecDeque::new(),
            randomness: HashMap::new(),
            agreement_cut: 0,
            synced_last_block: None,
        }
    }
}
