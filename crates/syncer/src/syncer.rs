//! The syncer: feeding finalized history until live agreement overlaps it.

use crate::{
    agreement::{AgreementInput, AgreementWorker},
    aligner::ensure_overlap_round,
    detector::{chains_validated, tips_overlap_pending},
    ensure,
    error::{SyncerError, SyncerResult},
    fabric::DummyReceiver,
    handoff::SyncedConsensus,
    ledger::ConfigLedger,
    locator::find_sync_boundary,
    network::SyncNetwork,
    state::SyncState,
    verifier::TsigVerifierCache,
};
use parking_lot::{Mutex, RwLock};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};
use wv_config::SyncerConfig;
use wv_storage::{BlockStore, BlockStoreError};
use wv_types::{
    sort_by_age, Block, BlockHash, ChainId, Database, Governance, Lattice, LatticeBuilder,
    Notifier, Round, TaskManager,
};

#[cfg(test)]
#[path = "tests/syncer_tests.rs"]
mod syncer_tests;

/// Catches a node up by replaying finalized history into a delivery engine
/// while shadowing live agreement, until the two demonstrably overlap.
///
/// Drive it by feeding batches of consecutively finalized blocks to
/// [`Self::sync_blocks`]; once it returns true, [`Self::synced_consensus`]
/// yields the warm state bundle a consensus engine continues from.
pub struct Syncer<DB: Database, G: Governance, B: LatticeBuilder> {
    inner: Arc<Inner<DB, G, B>>,
}

/// State shared between the public handle and the spawned loops.
///
/// Lock order where both are needed: `state` first, then `lattice`. Neither
/// is ever held across an await point.
pub(crate) struct Inner<DB: Database, G: Governance, B: LatticeBuilder> {
    pub(crate) config: SyncerConfig<DB, G>,
    pub(crate) network: SyncNetwork,
    pub(crate) lattice_builder: B,
    pub(crate) state: RwLock<SyncState>,
    pub(crate) lattice: Mutex<Option<B::Lattice>>,
    pub(crate) verifier_cache: TsigVerifierCache<G>,
    /// Winds down the dispatcher and the round monitor.
    pub(crate) shutdown: Notifier,
    /// Sender sides of the confirmed-block and pull streams, cloned into
    /// each agreement worker. `None` once stopped.
    pub(crate) feed_tx: Mutex<Option<(mpsc::Sender<Block>, mpsc::Sender<BlockHash>)>>,
    /// Receiver sides, parked here until the feed loop starts.
    pub(crate) feed_rx: Mutex<Option<(mpsc::Receiver<Block>, mpsc::Receiver<BlockHash>)>>,
    pub(crate) fabric_tasks: TaskManager,
    pub(crate) worker_tasks: TaskManager,
    pub(crate) feed_tasks: TaskManager,
    pub(crate) stopped: AtomicBool,
    /// Buffers inbound traffic between stop and handoff.
    pub(crate) dummy: Mutex<Option<DummyReceiver>>,
    pub(crate) synced: tokio::sync::Mutex<Option<Arc<SyncedConsensus<DB, G, B::Lattice>>>>,
}

impl<DB: Database, G: Governance, B: LatticeBuilder> Syncer<DB, G, B> {
    /// Create a syncer. Nothing runs until a sync boundary is located; until
    /// then the instance only stores and verifies what it is fed.
    pub fn new(
        config: SyncerConfig<DB, G>,
        network: SyncNetwork,
        lattice_builder: B,
    ) -> SyncerResult<Self> {
        let genesis_config =
            config.governance().round_config(0).ok_or(SyncerError::MissingConfig(0))?;
        let ledger = ConfigLedger::new(config.genesis_time(), genesis_config);
        let capacity = config.parameters().channel_capacity;
        let (confirmed_tx, confirmed_rx) = mpsc::channel(capacity);
        let (pull_tx, pull_rx) = mpsc::channel(capacity);
        let verifier_cache = TsigVerifierCache::new(
            config.governance().clone(),
            config.parameters().tsig_cache_rounds,
        );
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                network,
                lattice_builder,
                state: RwLock::new(SyncState::new(ledger)),
                lattice: Mutex::new(None),
                verifier_cache,
                shutdown: Notifier::new(),
                feed_tx: Mutex::new(Some((confirmed_tx, pull_tx))),
                feed_rx: Mutex::new(Some((confirmed_rx, pull_rx))),
                fabric_tasks: TaskManager::new("syncer fabric"),
                worker_tasks: TaskManager::new("agreement workers"),
                feed_tasks: TaskManager::new("syncer feed"),
                stopped: AtomicBool::new(false),
                dummy: Mutex::new(None),
                synced: tokio::sync::Mutex::new(None),
            }),
        })
    }

    /// Feed one batch of consecutively finalized blocks, oldest first. Set
    /// `latest` when the batch reaches the current tip of the source; only
    /// then is it worth checking whether sync completed.
    ///
    /// Returns true exactly once, on the call that completes sync.
    pub async fn sync_blocks(&self, blocks: &[Block], latest: bool) -> SyncerResult<bool> {
        let result = self.sync_blocks_inner(blocks, latest).await;
        match &result {
            Ok(synced) => {
                debug!(target: "syncer", synced, latest, count = blocks.len(), "sync_blocks returned")
            }
            Err(err) => {
                debug!(target: "syncer", %err, latest, count = blocks.len(), "sync_blocks failed")
            }
        }
        result
    }

    async fn sync_blocks_inner(&self, blocks: &[Block], latest: bool) -> SyncerResult<bool> {
        let inner = &self.inner;
        ensure!(inner.state.read().synced_last_block.is_none(), SyncerError::AlreadySynced);
        let Some(last_block) = blocks.last() else {
            return Ok(false);
        };
        for pair in blocks.windows(2) {
            ensure!(
                pair[1].finalization.height == pair[0].finalization.height + 1,
                SyncerError::InvalidBlockOrder
            );
        }
        let expected =
            inner.config.db().chain_tip().map(|(_, height)| height).unwrap_or(0) + 1;
        let got = blocks[0].finalization.height;
        if got != expected {
            error!(target: "syncer", got, expected, "mismatched finalization height");
            return Err(SyncerError::InvalidSyncingHeight { expected, got });
        }
        trace!(
            target: "syncer",
            position = %blocks[0].position,
            height = got,
            count = blocks.len(),
            latest,
            "syncing finalized blocks"
        );
        self.setup_configs(blocks)?;
        for block in blocks {
            self.store_and_process(block)?;
        }
        if latest && inner.lattice.lock().is_none() {
            let boundary = {
                let state = inner.state.read();
                find_sync_boundary(inner.config.db(), &state.ledger, last_block)
            };
            let boundary = match boundary {
                Ok(boundary) => boundary,
                Err(SyncerError::GenesisReached) => {
                    debug!(
                        target: "syncer",
                        "boundary search hit genesis; need blocks reaching further back"
                    );
                    return Ok(false);
                }
                Err(err) => return Err(err),
            };
            if let Some(boundary) = boundary {
                debug!(target: "syncer", block = %boundary, "deliver set boundary found");
                self.init_consensus(&boundary)?;
                // The resize that came with the ledger extension ran before
                // the workers could exist; repeat it now that they can.
                self.setup_configs(blocks)?;
                let replay = self.collect_replay(&boundary, last_block)?;
                for block in &replay {
                    self.process_finalized(block)?;
                }
            }
        }
        if latest
            && inner.ensure_overlap()?
            && inner.chains_validated_check()
            && inner.synced_check(last_block)?
        {
            self.stop().await?;
            inner.launch_dummy_receiver();
            inner.state.write().synced_last_block = Some(last_block.clone());
            return Ok(true);
        }
        Ok(false)
    }

    /// Wind everything down: the dispatching loops first, then the
    /// agreement workers, then the feed they write into. Idempotent.
    pub async fn stop(&self) -> SyncerResult<()> {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            debug!(target: "syncer", "stop called more than once");
            return Ok(());
        }
        trace!(target: "syncer", "syncer is about to stop");
        inner.shutdown.notify();
        inner.fabric_tasks.join_all().await;
        trace!(target: "syncer", "stopping agreement workers");
        // Dropping the input senders lets each worker drain and exit.
        inner.state.write().workers.clear();
        inner.worker_tasks.join_all().await;
        // With the workers gone, closing our sender halves ends the feed.
        *inner.feed_tx.lock() = None;
        inner.feed_tasks.join_all().await;
        trace!(target: "syncer", "syncer stopped");
        Ok(())
    }

    /// The handoff bundle. Errors with [`SyncerError::NotSynced`] until the
    /// [`Self::sync_blocks`] call that returns true; afterwards every call
    /// yields the same bundle.
    pub async fn synced_consensus(
        &self,
    ) -> SyncerResult<Arc<SyncedConsensus<DB, G, B::Lattice>>> {
        let inner = &self.inner;
        let mut cached = inner.synced.lock().await;
        if let Some(existing) = cached.as_ref() {
            return Ok(Arc::clone(existing));
        }
        let (last_block, begin_time, lattice, pending, randomness) = {
            let mut state = inner.state.write();
            let Some(last_block) = state.synced_last_block.clone() else {
                return Err(SyncerError::NotSynced);
            };
            let round = last_block.position.round;
            let begin_time =
                state.ledger.begin_time(round).ok_or(SyncerError::MissingConfig(round))?;
            let Some(lattice) = inner.lattice.lock().take() else {
                return Err(SyncerError::NotSynced);
            };
            let pending = std::mem::take(&mut state.pending);
            let randomness: Vec<_> =
                std::mem::take(&mut state.randomness).into_values().collect();
            (last_block, begin_time, lattice, pending, randomness)
        };
        // Wind down the buffering receiver and collect what it caught.
        let mut buffered = Vec::new();
        if let Some(dummy) = inner.dummy.lock().take() {
            buffered = dummy.finish().await;
        }
        let synced = Arc::new(SyncedConsensus::new(
            last_block,
            begin_time,
            inner.config.clone(),
            inner.network.clone(),
            lattice,
            pending,
            randomness,
            buffered,
        ));
        *cached = Some(Arc::clone(&synced));
        Ok(synced)
    }

    /// Extend the ledger far enough ahead of the newest round in `blocks`.
    fn setup_configs(&self, blocks: &[Block]) -> SyncerResult<()> {
        let max_round = blocks.iter().map(|block| block.position.round).max().unwrap_or(0);
        let shift = self.inner.config.parameters().config_round_shift;
        self.inner.extend_configs_to(max_round + shift.saturating_sub(1))
    }

    /// Persist one finalized block, advance the chain tip, and feed the
    /// delivery engine.
    fn store_and_process(&self, block: &Block) -> SyncerResult<()> {
        let db = self.inner.config.db();
        if let Err(err) = db.put_block(block) {
            // Known from an earlier pull; its finalization fields are new.
            match err.downcast_ref::<BlockStoreError>() {
                Some(BlockStoreError::BlockExists(_)) => db.update_block(block)?,
                _ => return Err(err.into()),
            }
        }
        db.put_chain_tip(block.hash, block.finalization.height)?;
        self.process_finalized(block)
    }

    /// Feed one finalized block to the delivery engine and reconcile what it
    /// delivers against finalization order.
    fn process_finalized(&self, block: &Block) -> SyncerResult<()> {
        let inner = &self.inner;
        let mut state = inner.state.write();
        let delivered = {
            let mut lattice = inner.lattice.lock();
            let Some(lattice) = lattice.as_mut() else { return Ok(()) };
            lattice.process_finalized_block(block).map_err(SyncerError::Lattice)?
        };
        state.finalized.push_back(block.hash);
        for (idx, delivered_block) in delivered.iter().enumerate() {
            ensure!(
                state.finalized.get(idx) == Some(&delivered_block.hash),
                SyncerError::MismatchBlockHashSequence
            );
            state.validated.insert(delivered_block.position.chain);
        }
        state.finalized.drain(..delivered.len());
        Ok(())
    }

    /// Build the delivery engine rooted at `boundary` and start the live
    /// loops that shadow agreement from here on.
    fn init_consensus(&self, boundary: &Block) -> SyncerResult<()> {
        let inner = &self.inner;
        {
            let mut state = inner.state.write();
            let round = boundary.position.round;
            let begin =
                state.ledger.begin_time(round).ok_or(SyncerError::MissingConfig(round))?;
            let config = state.ledger.config(round).ok_or(SyncerError::MissingConfig(round))?;
            let lattice = inner.lattice_builder.build(round, begin, config);
            *inner.lattice.lock() = Some(lattice);
            state.lattice_round = round;
            debug!(target: "syncer", round, "delivery engine initialized");
        }
        inner.start_agreement();
        inner.start_network();
        inner.start_crs_monitor();
        Ok(())
    }

    /// The finalized blocks from `boundary` through `last`, oldest first,
    /// read back from storage.
    fn collect_replay(&self, boundary: &Block, last: &Block) -> SyncerResult<Vec<Block>> {
        let db = self.inner.config.db();
        let span =
            last.finalization.height.saturating_sub(boundary.finalization.height) as usize + 1;
        let mut replay = Vec::with_capacity(span);
        let mut cursor = last.clone();
        loop {
            let parent_hash = cursor.finalization.parent_hash;
            let done = cursor.hash == boundary.hash;
            replay.push(cursor);
            if done {
                break;
            }
            cursor =
                db.get_block(&parent_hash)?.ok_or(SyncerError::BrokenChain(parent_hash))?;
        }
        replay.reverse();
        Ok(replay)
    }
}

#[cfg(test)]
impl<DB: Database, G: Governance, B: LatticeBuilder> Syncer<DB, G, B> {
    pub(crate) fn inner(&self) -> &Arc<Inner<DB, G, B>> {
        &self.inner
    }
}

impl<DB: Database, G: Governance, B: LatticeBuilder> Inner<DB, G, B> {
    /// Fetch configurations through `round`, tell the delivery engine about
    /// the new rounds, and widen the worker set if any of them grew the
    /// chain count.
    pub(crate) fn extend_configs_to(self: &Arc<Self>, round: Round) -> SyncerResult<()> {
        let new_max_chains = {
            let mut state = self.state.write();
            debug!(
                target: "syncer",
                until_round = round,
                known = state.ledger.rounds(),
                lattice_round = state.lattice_round,
                "extending configuration ledger"
            );
            let new_max_chains = state.ledger.extend_to(self.config.governance(), round)?;
            let mut lattice = self.lattice.lock();
            if let Some(lattice) = lattice.as_mut() {
                while state.lattice_round < round {
                    let next = state.lattice_round + 1;
                    let config = state
                        .ledger
                        .config(next)
                        .cloned()
                        .ok_or(SyncerError::MissingConfig(next))?;
                    lattice.append_config(next, &config).map_err(SyncerError::Lattice)?;
                    state.lattice_round = next;
                }
            }
            new_max_chains
        };
        self.resize_chains(new_max_chains);
        Ok(())
    }

    /// Grow the per-chain workers and pending queues to `num_chains`. Chains
    /// never shrink; a narrower later round just leaves the extra chains
    /// idle.
    pub(crate) fn resize_chains(self: &Arc<Self>, num_chains: u32) {
        let mut state = self.state.write();
        if (num_chains as usize) <= state.workers.len() {
            return;
        }
        let Some((confirmed_tx, pull_tx)) = self.feed_tx.lock().clone() else {
            return;
        };
        let capacity = self.config.parameters().channel_capacity;
        debug!(target: "syncer", chains = num_chains, "growing agreement chains");
        while state.workers.len() < num_chains as usize {
            let chain = state.workers.len() as ChainId;
            let (input_tx, input_rx) = mpsc::channel(capacity);
            let worker =
                AgreementWorker::new(chain, input_rx, confirmed_tx.clone(), pull_tx.clone());
            self.worker_tasks.spawn_task(format!("agreement-{chain}"), worker.run());
            state.workers.push(input_tx);
            state.pending.push(Vec::new());
        }
    }

    /// A confirmed block from an agreement worker joins its chain's pending
    /// queue, unless it predates the agreement cut.
    pub(crate) fn enqueue_confirmed(&self, block: Block) {
        let mut state = self.state.write();
        if state.agreement_cut > 0 && block.position.round < state.agreement_cut {
            return;
        }
        let warn_mark = self.config.parameters().pending_queue_warn;
        let chain = block.position.chain as usize;
        let Some(queue) = state.pending.get_mut(chain) else {
            debug!(target: "syncer", position = %block.position, "confirmed block for unknown chain");
            return;
        };
        queue.push(block);
        sort_by_age(queue);
        if queue.len() == warn_mark {
            tracing::warn!(target: "syncer", chain, len = warn_mark, "pending queue keeps growing");
        }
    }

    pub(crate) fn ensure_overlap(&self) -> SyncerResult<bool> {
        let mut state = self.state.write();
        ensure_overlap_round(&mut state)
    }

    pub(crate) fn chains_validated_check(&self) -> bool {
        let state = self.state.read();
        chains_validated(&state)
    }

    pub(crate) fn synced_check(&self, batch_last: &Block) -> SyncerResult<bool> {
        let state = self.state.read();
        tips_overlap_pending(self.config.db(), &state, batch_last)
    }
}
