//! Blocks of the per-chain lattice and their place on the compaction chain.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

/// A governance-defined configuration epoch.
pub type Round = u64;
/// Identifier of one chain in the DAG.
pub type ChainId = u32;
/// Height of a block within its own chain, or on the compaction chain.
pub type Height = u64;
/// Milliseconds since the unix epoch.
pub type TimestampMs = u64;

/// Current time in milliseconds since the unix epoch.
pub fn now() -> TimestampMs {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock set before the unix epoch")
        .as_millis() as TimestampMs
}

/// The 32-byte identity of a block.
///
/// Byte-wise ordering is load-bearing: total ordering emits each deliver set
/// in ascending hash order, so comparing a block's hash against its
/// finalization predecessor's hash reveals deliver-set boundaries.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    /// The zero hash. Doubles as the genesis pointer on the compaction chain
    /// and, together with a zero causal parent, marks an empty block.
    pub const ZERO: Self = Self([0; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// A hash with `value` in its trailing eight bytes, big-endian. Handy for
    /// building histories with a chosen hash order.
    pub fn from_low_u64_be(value: u64) -> Self {
        let mut bytes = [0; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for BlockHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for BlockHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = hex::encode(self.0);
        write!(f, "{}", full.get(0..16).ok_or(fmt::Error)?)
    }
}

/// A block's coordinates in the DAG: configuration round, owning chain, and
/// height within that chain.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub round: Round,
    pub chain: ChainId,
    pub height: Height,
}

impl Position {
    pub fn new(round: Round, chain: ChainId, height: Height) -> Self {
        Self { round, chain, height }
    }

    /// Age ordering over `(round, height)`. The chain id does not
    /// participate; positions are only age-compared within one chain, and
    /// there is deliberately no `Ord` impl that would suggest otherwise.
    pub fn age_cmp(&self, other: &Self) -> Ordering {
        (self.round, self.height).cmp(&(other.round, other.height))
    }

    /// True when `self` precedes `other` by round, then height.
    pub fn older(&self, other: &Self) -> bool {
        self.age_cmp(other) == Ordering::Less
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}-c{}-h{}", self.round, self.chain, self.height)
    }
}

/// Reference to external state observed by a block's proposer: a height plus
/// opaque payload interpreted by the application layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    pub height: Height,
    pub data: Vec<u8>,
}

/// A block's place on the single linear compaction chain.
///
/// The parent here is the previous *finalized* block, which usually lives on
/// a different chain than the block's causal parent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finalization {
    pub parent_hash: BlockHash,
    pub height: Height,
}

/// A block of the lattice.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: BlockHash,
    /// Causal parent within this block's own chain.
    pub parent_hash: BlockHash,
    pub position: Position,
    pub timestamp: TimestampMs,
    pub witness: Witness,
    /// Set once the block is finalized onto the compaction chain.
    pub finalization: Finalization,
    /// Hashes of acknowledged blocks, kept sorted.
    pub acks: Vec<BlockHash>,
}

impl Block {
    /// An empty block carries neither its own hash nor a causal parent; both
    /// stay zero. Agreement emits these as placeholders when a chain decides
    /// "no block" for a height.
    pub fn is_empty(&self) -> bool {
        self.hash.is_zero() && self.parent_hash.is_zero()
    }

    /// Height on the compaction chain.
    pub fn finalized_height(&self) -> Height {
        self.finalization.height
    }

    /// Content digest over the proposal fields. Finalization data arrives
    /// after the hash is fixed and so stays out of it.
    pub fn digest(&self) -> BlockHash {
        let mut hasher = crate::DefaultHashFunction::new();
        hasher.update(&crate::encode(&(self.parent_hash, self.position, self.timestamp)));
        hasher.update(&crate::encode(&self.witness));
        hasher.update(&crate::encode(&self.acks));
        BlockHash(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block({} @ {}, finalized {})",
            self.hash, self.position, self.finalization.height
        )
    }
}

/// Sort a run of blocks by position age, oldest first.
pub fn sort_by_age(blocks: &mut [Block]) {
    blocks.sort_by(|a, b| a.position.age_cmp(&b.position));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_order_is_bytewise() {
        let a = BlockHash::from_low_u64_be(1);
        let b = BlockHash::from_low_u64_be(2);
        assert!(a < b);
        assert!(BlockHash::ZERO < a);

        let mut high = [0; 32];
        high[0] = 1;
        assert!(b < BlockHash::new(high));
    }

    #[test]
    fn age_compares_round_before_height() {
        let old = Position::new(1, 0, 100);
        let new = Position::new(2, 7, 1);
        assert!(old.older(&new));
        assert!(!new.older(&old));
        // Same round falls back to height; the chain id never matters.
        assert!(Position::new(2, 3, 0).older(&Position::new(2, 0, 1)));
        assert_eq!(Position::new(2, 1, 5).age_cmp(&Position::new(2, 9, 5)), Ordering::Equal);
    }

    #[test]
    fn empty_block_detection() {
        let mut block = Block::default();
        assert!(block.is_empty());
        block.hash = BlockHash::from_low_u64_be(9);
        assert!(!block.is_empty());
    }

    #[test]
    fn digest_tracks_proposal_fields_only() {
        let mut block = Block {
            parent_hash: BlockHash::from_low_u64_be(3),
            position: Position::new(1, 2, 7),
            timestamp: 42,
            ..Default::default()
        };
        let digest = block.digest();

        // Finalization is assigned after hashing and must not change it.
        block.finalization = Finalization { parent_hash: BlockHash::from_low_u64_be(9), height: 4 };
        assert_eq!(block.digest(), digest);

        block.timestamp = 43;
        assert_ne!(block.digest(), digest);
    }

    #[test]
    fn sorting_orders_by_age() {
        let mut blocks: Vec<Block> = [(2, 1), (1, 4), (1, 2)]
            .into_iter()
            .map(|(round, height)| Block {
                position: Position::new(round, 0, height),
                ..Default::default()
            })
            .collect();
        sort_by_age(&mut blocks);
        let order: Vec<_> = blocks.iter().map(|b| (b.position.round, b.position.height)).collect();
        assert_eq!(order, vec![(1, 2), (1, 4), (2, 1)]);
    }
}
