//! A scripted delivery engine.

use parking_lot::Mutex;
use std::sync::Arc;
use wv_types::{Block, BlockHash, Lattice, LatticeBuilder, Round, RoundConfig, TimestampMs};

/// How a [`MockLattice`] answers each finalized block.
#[derive(Clone, Debug)]
pub enum DeliveryMode {
    /// Deliver each block the moment it is fed. Keeps delivery order equal
    /// to finalization order, which is what a healthy engine converges to.
    Immediate,
    /// Swallow everything; nothing is ever delivered.
    Silent,
    /// Always deliver a block carrying this hash, whatever was fed in. For
    /// exercising delivery-order mismatch handling.
    FixedHash(BlockHash),
}

/// What the mock observed, shared with the test through the builder.
#[derive(Default)]
pub struct LatticeLog {
    /// Round and begin time the engine was built at.
    pub built_at: Option<(Round, TimestampMs)>,
    /// Configuration the engine was built with.
    pub build_config: Option<RoundConfig>,
    /// Every block fed through `process_finalized_block`, in order.
    pub fed: Vec<Block>,
    /// Rounds appended through `append_config`, in order.
    pub appended_rounds: Vec<Round>,
}

/// Builds [`MockLattice`]s and keeps a handle on what they see.
#[derive(Clone)]
pub struct MockLatticeBuilder {
    mode: DeliveryMode,
    fail_append: bool,
    log: Arc<Mutex<LatticeLog>>,
}

impl MockLatticeBuilder {
    pub fn new(mode: DeliveryMode) -> Self {
        Self { mode, fail_append: false, log: Arc::new(Mutex::new(LatticeLog::default())) }
    }

    /// The common case: every fed block delivered immediately.
    pub fn immediate() -> Self {
        Self::new(DeliveryMode::Immediate)
    }

    /// Make `append_config` fail, for exercising the fatal config path.
    pub fn with_failing_append(mut self) -> Self {
        self.fail_append = true;
        self
    }

    /// The shared observation log. Valid before and after the lattice is
    /// handed off.
    pub fn log(&self) -> Arc<Mutex<LatticeLog>> {
        Arc::clone(&self.log)
    }
}

impl LatticeBuilder for MockLatticeBuilder {
    type Lattice = MockLattice;

    fn build(&self, round: Round, begin: TimestampMs, config: &RoundConfig) -> MockLattice {
        let mut log = self.log.lock();
        log.built_at = Some((round, begin));
        log.build_config = Some(config.clone());
        MockLattice {
            mode: self.mode.clone(),
            fail_append: self.fail_append,
            log: Arc::clone(&self.log),
        }
    }
}

/// A delivery engine that follows its [`DeliveryMode`] script.
pub struct MockLattice {
    mode: DeliveryMode,
    fail_append: bool,
    log: Arc<Mutex<LatticeLog>>,
}

impl Lattice for MockLattice {
    fn process_finalized_block(&mut self, block: &Block) -> eyre::Result<Vec<Block>> {
        self.log.lock().fed.push(block.clone());
        Ok(match &self.mode {
            DeliveryMode::Immediate => vec![block.clone()],
            DeliveryMode::Silent => Vec::new(),
            DeliveryMode::FixedHash(hash) => vec![Block { hash: *hash, ..block.clone() }],
        })
    }

    fn append_config(&mut self, round: Round, _config: &RoundConfig) -> eyre::Result<()> {
        if self.fail_append {
            eyre::bail!("configuration rejected for round {round}");
        }
        self.log.lock().appended_rounds.push(round);
        Ok(())
    }
}
