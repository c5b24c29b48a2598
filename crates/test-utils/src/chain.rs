//! Builder for finalized histories with chosen deliver-set boundaries.

use wv_storage::BlockStore;
use wv_types::{
    Block, BlockHash, ChainId, Database, Finalization, Position, Round, Witness,
};

/// A finalized history laid out as explicit deliver sets.
///
/// Total ordering emits each deliver set in ascending hash order, and a
/// block whose hash is not above its finalization parent's marks a set
/// boundary. The builder assigns hashes so that blocks ascend within each
/// set and drop at every boundary, which is exactly the shape boundary
/// search keys on.
pub struct ChainFixture {
    blocks: Vec<Block>,
    set_starts: Vec<usize>,
}

impl ChainFixture {
    pub fn builder(num_chains: u32) -> ChainFixtureBuilder {
        ChainFixtureBuilder { num_chains, sets: Vec::new() }
    }

    /// The whole history in finalization order. Finalization heights run
    /// `1..=len`, so a fresh database accepts it as a first batch.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// The newest finalized block.
    pub fn last(&self) -> &Block {
        self.blocks.last().expect("fixture has at least one set")
    }

    pub fn num_sets(&self) -> usize {
        self.set_starts.len()
    }

    /// The first block of deliver set `set` (0-based, oldest first).
    pub fn set_first(&self, set: usize) -> &Block {
        &self.blocks[self.set_starts[set]]
    }

    /// The last block of deliver set `set`.
    pub fn set_last(&self, set: usize) -> &Block {
        let end = self.set_starts.get(set + 1).copied().unwrap_or(self.blocks.len());
        &self.blocks[end - 1]
    }

    /// Store the whole history, blocks and chain tip both.
    pub fn seed<DB: Database>(&self, db: &DB) {
        db.seed_finalized_chain_for_test(&self.blocks);
    }
}

/// Accumulates deliver sets for a [`ChainFixture`].
pub struct ChainFixtureBuilder {
    num_chains: u32,
    sets: Vec<(Round, Vec<ChainId>)>,
}

impl ChainFixtureBuilder {
    /// Append one deliver set in `round`: one block per listed chain,
    /// finalized in listing order.
    pub fn deliver_set(mut self, round: Round, chains: &[ChainId]) -> Self {
        assert!(chains.len() < 1_000, "deliver sets beyond 999 blocks break hash layout");
        self.sets.push((round, chains.to_vec()));
        self
    }

    pub fn build(self) -> ChainFixture {
        let num_sets = self.sets.len();
        let mut next_height = vec![0u64; self.num_chains as usize];
        let mut causal_tip = vec![BlockHash::ZERO; self.num_chains as usize];
        let mut fin_parent = BlockHash::ZERO;
        let mut fin_height = 0u64;
        let mut blocks = Vec::new();
        let mut set_starts = Vec::new();

        for (set_index, (round, chains)) in self.sets.into_iter().enumerate() {
            set_starts.push(blocks.len());
            // Bases descend per set so every boundary is a hash drop.
            let base = (num_sets - set_index) as u64 * 1_000;
            for (offset, chain) in chains.into_iter().enumerate() {
                assert!(chain < self.num_chains, "chain {chain} outside fixture width");
                let hash = BlockHash::from_low_u64_be(base + offset as u64 + 1);
                fin_height += 1;
                let position = Position::new(round, chain, next_height[chain as usize]);
                next_height[chain as usize] += 1;
                let parent_hash = causal_tip[chain as usize];
                let acks = if parent_hash.is_zero() { Vec::new() } else { vec![parent_hash] };
                blocks.push(Block {
                    hash,
                    parent_hash,
                    position,
                    timestamp: 1_000 * fin_height,
                    witness: Witness { height: fin_height, data: Vec::new() },
                    finalization: Finalization { parent_hash: fin_parent, height: fin_height },
                    acks,
                });
                causal_tip[chain as usize] = hash;
                fin_parent = hash;
            }
        }
        ChainFixture { blocks, set_starts }
    }
}
