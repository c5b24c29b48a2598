//! Typed messages the transport delivers while syncing.

use crate::{Block, BlockHash, BlsSignature, Position};
use serde::{Deserialize, Serialize};

/// Common random seed for one round.
pub type Crs = [u8; 32];

/// Inbound traffic from the transport.
///
/// The sync layer routes blocks and agreement results to the matching
/// chain's agreement worker, caches randomness results, and drops votes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum SyncMessage {
    /// A block relayed by a peer.
    Block(Box<Block>),
    /// The outcome of Byzantine agreement for one position.
    AgreementResult(AgreementResult),
    /// Threshold-signed randomness for an agreed block.
    Randomness(RandomnessResult),
    /// A single agreement vote. Not processed by this layer.
    Vote(Vote),
}

impl SyncMessage {
    /// The position a routable message is addressed by, if it has one.
    pub fn position(&self) -> Option<Position> {
        match self {
            Self::Block(block) => Some(block.position),
            Self::AgreementResult(result) => Some(result.position),
            Self::Randomness(_) | Self::Vote(_) => None,
        }
    }
}

/// The outcome of Byzantine agreement for one position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementResult {
    pub block_hash: BlockHash,
    pub position: Position,
    /// The chain agreed on "no block" for this height; the block itself will
    /// never arrive and a placeholder stands in for it.
    pub is_empty_block: bool,
}

/// A threshold signature over an agreed block's hash.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RandomnessResult {
    pub block_hash: BlockHash,
    pub position: Position,
    pub randomness: BlsSignature,
}

/// A single agreement vote.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Vote {
    pub block_hash: BlockHash,
    pub position: Position,
    pub signature: BlsSignature,
}
