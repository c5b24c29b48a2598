//! The state bundle handed to the consensus engine after sync.

use crate::network::SyncNetwork;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use wv_config::SyncerConfig;
use wv_types::{Block, RandomnessResult, SyncMessage, TimestampMs};

/// Everything a consensus engine needs to continue from where sync stopped.
///
/// Built exactly once per syncer. The delivery engine inside is the one the
/// syncer warmed up; pending blocks and randomness are the agreement output
/// that was confirmed but not yet finalized; buffered messages arrived
/// between the syncer stopping and the handoff.
pub struct SyncedConsensus<DB, G, L> {
    last_block: Block,
    round_begin_time: TimestampMs,
    config: SyncerConfig<DB, G>,
    network: SyncNetwork,
    lattice: Mutex<L>,
    pending_blocks: Vec<Vec<Block>>,
    randomness: Vec<RandomnessResult>,
    buffered_messages: Vec<SyncMessage>,
}

impl<DB, G, L> SyncedConsensus<DB, G, L> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        last_block: Block,
        round_begin_time: TimestampMs,
        config: SyncerConfig<DB, G>,
        network: SyncNetwork,
        lattice: L,
        pending_blocks: Vec<Vec<Block>>,
        randomness: Vec<RandomnessResult>,
        buffered_messages: Vec<SyncMessage>,
    ) -> Self {
        Self {
            last_block,
            round_begin_time,
            config,
            network,
            lattice: Mutex::new(lattice),
            pending_blocks,
            randomness,
            buffered_messages,
        }
    }

    /// The newest finalized block at the moment sync completed.
    pub fn last_block(&self) -> &Block {
        &self.last_block
    }

    /// When the last block's round began.
    pub fn round_begin_time(&self) -> TimestampMs {
        self.round_begin_time
    }

    /// The collaborator bundle the syncer ran with; the engine keeps using
    /// it.
    pub fn config(&self) -> &SyncerConfig<DB, G> {
        &self.config
    }

    /// The transport seam. Its inbound stream is idle and waiting for the
    /// next consumer.
    pub fn network(&self) -> &SyncNetwork {
        &self.network
    }

    /// The warmed-up delivery engine.
    pub fn lattice(&self) -> MutexGuard<'_, L> {
        self.lattice.lock()
    }

    /// Agreement-confirmed blocks not yet finalized, one age-sorted queue
    /// per chain.
    pub fn pending_blocks(&self) -> &[Vec<Block>] {
        &self.pending_blocks
    }

    /// Verified randomness for blocks around the handoff point.
    pub fn randomness(&self) -> &[RandomnessResult] {
        &self.randomness
    }

    /// Messages that arrived between stop and handoff, in arrival order.
    pub fn buffered_messages(&self) -> &[SyncMessage] {
        &self.buffered_messages
    }
}

impl<DB, G, L> fmt::Debug for SyncedConsensus<DB, G, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncedConsensus")
            .field("last_block", &self.last_block)
            .field("pending_chains", &self.pending_blocks.len())
            .field("randomness", &self.randomness.len())
            .field("buffered_messages", &self.buffered_messages.len())
            .finish_non_exhaustive()
    }
}
