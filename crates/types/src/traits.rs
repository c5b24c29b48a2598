//! Contracts of the collaborators the sync layer drives.

use crate::{Block, BlsPublicKey, Crs, Round, RoundConfig, TimestampMs};

/// Round-indexed configuration and randomness source.
///
/// Configs must be published before the rounds that need them; a missing
/// config at a round the chain has reached is an invariant violation, not a
/// soft error. CRS and group keys become available some time into the
/// preceding round, so absence of those is ordinary.
pub trait Governance: Clone + Send + Sync + 'static {
    /// The configuration for `round`, if governance has published it.
    fn round_config(&self, round: Round) -> Option<RoundConfig>;

    /// The common random seed for `round`. `None` until the seed is ready.
    fn crs(&self, round: Round) -> Option<Crs>;

    /// The group public key verifying threshold randomness of `round`.
    /// `None` until the round's key setup has completed.
    fn tsig_group_key(&self, round: Round) -> Option<BlsPublicKey>;
}

/// The per-chain causal structure that consumes finalized blocks and emits
/// per-chain delivery order.
pub trait Lattice: Send + 'static {
    /// Feed one finalized block; returns the blocks now delivered, in
    /// delivery order.
    fn process_finalized_block(&mut self, block: &Block) -> eyre::Result<Vec<Block>>;

    /// Register the configuration of a newly published round. Rounds arrive
    /// one at a time, in order.
    fn append_config(&mut self, round: Round, config: &RoundConfig) -> eyre::Result<()>;
}

/// Builds the lattice when the sync layer locates its bootstrap block.
pub trait LatticeBuilder: Send + Sync + 'static {
    type Lattice: Lattice;

    /// Create a lattice rooted at `round`, which began at `begin`.
    fn build(&self, round: Round, begin: TimestampMs, config: &RoundConfig) -> Self::Lattice;
}
