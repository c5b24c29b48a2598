//! Per-chain agreement tracking while syncing.
//!
//! One worker per chain pairs incoming blocks with agreement results and
//! emits each block exactly once, onto the shared confirmed stream. Results
//! for rounds whose common random seed has not been observed yet are parked
//! until the round monitor reports the seed.

use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::mpsc;
use tracing::trace;
use wv_types::{AgreementResult, Block, BlockHash, ChainId, Position, Round};

#[cfg(test)]
#[path = "tests/agreement_tests.rs"]
mod agreement_tests;

/// Input to one chain's agreement worker.
#[derive(Debug)]
pub(crate) enum AgreementInput {
    /// A block relayed by a peer for this chain.
    Block(Box<Block>),
    /// An agreement outcome for this chain.
    Result(AgreementResult),
    /// The common random seed through `Round` is available.
    RoundReady(Round),
}

/// Pairs blocks with agreement results for one chain.
pub(crate) struct AgreementWorker {
    chain: ChainId,
    input: mpsc::Receiver<AgreementInput>,
    confirmed_tx: mpsc::Sender<Block>,
    pull_tx: mpsc::Sender<BlockHash>,
    /// Blocks seen before their agreement result, keyed by position then
    /// hash. Agreement may fail over candidates at one position, so all of
    /// them are kept until a result picks one.
    blocks: HashMap<Position, HashMap<BlockHash, Block>>,
    /// Results whose block has not arrived; a pull for it is in flight.
    awaiting: HashSet<BlockHash>,
    /// Hashes already emitted.
    confirmed: HashSet<BlockHash>,
    /// Positions already emitted as empty placeholders. Placeholders carry
    /// the zero hash, so hash-based dedup cannot tell them apart.
    confirmed_empty: HashSet<Position>,
    /// Highest round whose common random seed has been observed.
    ready_round: Round,
    /// Results parked until their round's seed is observed.
    deferred: BTreeMap<Round, HashMap<BlockHash, AgreementResult>>,
}

impl AgreementWorker {
    pub(crate) fn new(
        chain: ChainId,
        input: mpsc::Receiver<AgreementInput>,
        confirmed_tx: mpsc::Sender<Block>,
        pull_tx: mpsc::Sender<BlockHash>,
    ) -> Self {
        Self {
            chain,
            input,
            confirmed_tx,
            pull_tx,
            blocks: HashMap::new(),
            awaiting: HashSet::new(),
            confirmed: HashSet::new(),
            confirmed_empty: HashSet::new(),
            ready_round: 0,
            deferred: BTreeMap::new(),
        }
    }

    /// Drive the worker until its input channel closes.
    pub(crate) async fn run(mut self) {
        while let Some(input) = self.input.recv().await {
            match input {
                AgreementInput::Block(block) => self.process_block(*block).await,
                AgreementInput::Result(result) => self.process_result(result).await,
                AgreementInput::RoundReady(round) => self.process_round_ready(round).await,
            }
        }
        trace!(target: "syncer::agreement", chain = self.chain, "agreement worker input closed");
    }

    async fn process_block(&mut self, block: Block) {
        if block.is_empty() {
            // An empty block is its own agreement outcome.
            let result = AgreementResult {
                block_hash: block.hash,
                position: block.position,
                is_empty_block: true,
            };
            self.process_result(result).await;
            return;
        }
        if self.confirmed.contains(&block.hash) {
            return;
        }
        if self.awaiting.contains(&block.hash) {
            self.confirm(block).await;
        } else {
            self.blocks.entry(block.position).or_default().insert(block.hash, block);
        }
    }

    async fn process_result(&mut self, result: AgreementResult) {
        if self.confirmed.contains(&result.block_hash)
            || self.confirmed_empty.contains(&result.position)
        {
            return;
        }
        if result.position.round > self.ready_round {
            trace!(
                target: "syncer::agreement",
                chain = self.chain,
                position = %result.position,
                ready = self.ready_round,
                "parking agreement result until its round's seed arrives"
            );
            self.deferred
                .entry(result.position.round)
                .or_default()
                .insert(result.block_hash, result);
            return;
        }
        if result.is_empty_block {
            let placeholder = Block { position: result.position, ..Default::default() };
            self.confirm(placeholder).await;
            return;
        }
        let stashed = self
            .blocks
            .get_mut(&result.position)
            .and_then(|candidates| candidates.remove(&result.block_hash));
        match stashed {
            Some(block) => self.confirm(block).await,
            None => {
                // Pull whether or not a request is already in flight; the
                // repeat covers a lost response.
                self.awaiting.insert(result.block_hash);
                let _ = self.pull_tx.send(result.block_hash).await;
            }
        }
    }

    async fn process_round_ready(&mut self, round: Round) {
        if round <= self.ready_round {
            return;
        }
        self.ready_round = round;
        // Replay everything parked at or below the new bound, oldest round
        // first.
        let still_deferred = self.deferred.split_off(&(round + 1));
        let ready = std::mem::replace(&mut self.deferred, still_deferred);
        for (round, results) in ready {
            trace!(
                target: "syncer::agreement",
                chain = self.chain,
                round,
                count = results.len(),
                "replaying parked agreement results"
            );
            for (_, result) in results {
                self.process_result(result).await;
            }
        }
    }

    async fn confirm(&mut self, block: Block) {
        if block.is_empty() {
            if !self.confirmed_empty.insert(block.position) {
                return;
            }
        } else {
            if !self.confirmed.insert(block.hash) {
                return;
            }
            self.awaiting.remove(&block.hash);
            self.blocks.remove(&block.position);
        }
        trace!(target: "syncer::agreement", chain = self.chain, block = %block, "confirming block");
        let _ = self.confirmed_tx.send(block).await;
    }
}
