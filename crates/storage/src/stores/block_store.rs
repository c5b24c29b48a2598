//! Persistence of finalized blocks and the compaction chain tip.

use crate::{
    tables::{Blocks, ChainTip},
    StoreResult,
};
use tracing::debug;
use wv_types::{Block, BlockHash, Database, DbTxMut as _, Height};

/// Failure modes a caller may want to branch on. Anything else a store
/// surfaces is environmental.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlockStoreError {
    /// Put of a block whose hash is already stored.
    #[error("block {0} already exists")]
    BlockExists(BlockHash),
    /// Update of a block that was never stored.
    #[error("block {0} does not exist")]
    BlockMissing(BlockHash),
    /// The compaction chain tip only moves forward.
    #[error("chain tip may only advance: stored height {stored}, put {put}")]
    TipRegression { stored: Height, put: Height },
}

/// Block persistence on top of any [`Database`].
/// Uses DB tables:
///   - Blocks
///   - ChainTip
pub trait BlockStore: Clone {
    /// Fetch a block by hash.
    fn get_block(&self, hash: &BlockHash) -> StoreResult<Option<Block>>;

    /// Write a new block. Fails with [`BlockStoreError::BlockExists`] if the
    /// hash is already present.
    fn put_block(&self, block: &Block) -> StoreResult<()>;

    /// Overwrite a stored block, normally to attach finalization data. Fails
    /// with [`BlockStoreError::BlockMissing`] if the hash was never stored.
    fn update_block(&self, block: &Block) -> StoreResult<()>;

    /// The newest finalized hash and its compaction chain height.
    fn chain_tip(&self) -> Option<(BlockHash, Height)>;

    /// Record `hash` as the tip at `height`, which must exceed the stored
    /// tip height.
    fn put_chain_tip(&self, hash: BlockHash, height: Height) -> StoreResult<()>;

    /// Persist an already-finalized history in one transaction, ONLY for
    /// testing. Panics if the write fails.
    fn seed_finalized_chain_for_test(&self, blocks: &[Block]);
}

impl<DB: Database> BlockStore for DB {
    fn get_block(&self, hash: &BlockHash) -> StoreResult<Option<Block>> {
        self.get::<Blocks>(hash)
    }

    fn put_block(&self, block: &Block) -> StoreResult<()> {
        if self.contains_key::<Blocks>(&block.hash)? {
            return Err(BlockStoreError::BlockExists(block.hash).into());
        }
        self.insert::<Blocks>(&block.hash, block)
    }

    fn update_block(&self, block: &Block) -> StoreResult<()> {
        if !self.contains_key::<Blocks>(&block.hash)? {
            return Err(BlockStoreError::BlockMissing(block.hash).into());
        }
        self.insert::<Blocks>(&block.hash, block)
    }

    fn chain_tip(&self) -> Option<(BlockHash, Height)> {
        self.last_record::<ChainTip>().map(|(height, hash)| (hash, height))
    }

    fn put_chain_tip(&self, hash: BlockHash, height: Height) -> StoreResult<()> {
        if let Some((_, stored)) = self.chain_tip() {
            if height <= stored {
                return Err(BlockStoreError::TipRegression { stored, put: height }.into());
            }
        }
        debug!(target: "storage", %hash, height, "advancing chain tip");
        self.insert::<ChainTip>(&height, &hash)
    }

    fn seed_finalized_chain_for_test(&self, blocks: &[Block]) {
        let mut txn = self.write_txn().expect("failed to get DB txn");
        for block in blocks {
            txn.insert::<Blocks>(&block.hash, block).expect("error seeding block");
            txn.insert::<ChainTip>(&block.finalization.height, &block.hash)
                .expect("error seeding chain tip");
        }
        txn.commit().expect("error committing seeded chain");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem_db::MemDatabase;
    use assert_matches::assert_matches;
    use wv_types::{Finalization, Position};

    fn block(seed: u64, finalized: Height) -> Block {
        Block {
            hash: BlockHash::from_low_u64_be(seed),
            position: Position::new(0, 0, finalized.saturating_sub(1)),
            finalization: Finalization { parent_hash: BlockHash::ZERO, height: finalized },
            ..Default::default()
        }
    }

    #[test]
    fn put_and_get_round_trip() {
        let db = MemDatabase::default();
        let block = block(1, 1);
        db.put_block(&block).expect("put");
        assert_eq!(db.get_block(&block.hash).expect("get"), Some(block));
        assert_eq!(db.get_block(&BlockHash::from_low_u64_be(9)).expect("get"), None);
    }

    #[test]
    fn duplicate_put_is_detected() {
        let db = MemDatabase::default();
        let block = block(1, 1);
        db.put_block(&block).expect("put");
        let err = db.put_block(&block).expect_err("duplicate put must fail");
        assert_matches!(
            err.downcast_ref::<BlockStoreError>(),
            Some(BlockStoreError::BlockExists(hash)) if *hash == block.hash
        );
    }

    #[test]
    fn update_requires_existing_block() {
        let db = MemDatabase::default();
        let mut block = block(1, 1);

        let err = db.update_block(&block).expect_err("update of absent block must fail");
        assert_matches!(
            err.downcast_ref::<BlockStoreError>(),
            Some(BlockStoreError::BlockMissing(_))
        );

        db.put_block(&block).expect("put");
        block.finalization.height = 7;
        db.update_block(&block).expect("update");
        assert_eq!(db.get_block(&block.hash).expect("get"), Some(block));
    }

    #[test]
    fn chain_tip_only_advances() {
        let db = MemDatabase::default();
        assert_eq!(db.chain_tip(), None);

        db.put_chain_tip(BlockHash::from_low_u64_be(1), 1).expect("tip 1");
        db.put_chain_tip(BlockHash::from_low_u64_be(2), 2).expect("tip 2");
        assert_eq!(db.chain_tip(), Some((BlockHash::from_low_u64_be(2), 2)));

        for stale in [1, 2] {
            let err = db
                .put_chain_tip(BlockHash::from_low_u64_be(9), stale)
                .expect_err("stale tip must fail");
            assert_matches!(
                err.downcast_ref::<BlockStoreError>(),
                Some(BlockStoreError::TipRegression { stored: 2, put }) if *put == stale
            );
        }
    }

    #[test]
    fn tip_survives_large_heights() {
        // Key order must be numeric, not lexicographic over some encoding.
        let db = MemDatabase::default();
        db.put_chain_tip(BlockHash::from_low_u64_be(1), 9).expect("tip");
        db.put_chain_tip(BlockHash::from_low_u64_be(2), 256).expect("tip");
        assert_eq!(db.chain_tip(), Some((BlockHash::from_low_u64_be(2), 256)));
    }

    #[test]
    fn seeded_chain_is_visible() {
        let db = MemDatabase::default();
        let blocks: Vec<_> = (1..=3).map(|h| block(h, h)).collect();
        db.seed_finalized_chain_for_test(&blocks);
        for block in &blocks {
            assert_eq!(db.get_block(&block.hash).expect("get").as_ref(), Some(block));
        }
        assert_eq!(db.chain_tip(), Some((blocks[2].hash, 3)));
    }
}
