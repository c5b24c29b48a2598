//! Error types for the sync layer.

use wv_types::{BlockHash, Round, StoreError};

/// Return an error if the condition fails.
#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            return Err($e);
        }
    };
}

/// Convenience alias for fallible sync-layer operations.
pub type SyncerResult<T> = Result<T, SyncerError>;

/// Ways the sync layer can fail.
#[derive(Debug, thiserror::Error)]
pub enum SyncerError {
    /// The syncer already reported itself synced; feeding it more blocks is a
    /// caller bug.
    #[error("consensus already synced")]
    AlreadySynced,
    /// Handoff was requested before the syncer reported synced.
    #[error("consensus not synced")]
    NotSynced,
    /// A batch whose finalization heights are not consecutive.
    #[error("blocks to sync are not consecutively finalized")]
    InvalidBlockOrder,
    /// The first block of a batch does not extend the stored compaction
    /// chain tip.
    #[error("mismatched finalization height: expected {expected}, got {got}")]
    InvalidSyncingHeight { expected: u64, got: u64 },
    /// A backward walk ran out of history. Recoverable: retry with a batch
    /// reaching further back.
    #[error("genesis block reached")]
    GenesisReached,
    /// Delivery order reported by the lattice diverged from finalization
    /// order. Local state is corrupt.
    #[error("mismatched block hash sequence")]
    MismatchBlockHashSequence,
    /// A finalization parent that should be on disk is not.
    #[error("missing block {0} on the finalized chain")]
    BrokenChain(BlockHash),
    /// Governance has no configuration for a round the chain has reached.
    #[error("no round config for round {0}")]
    MissingConfig(Round),
    /// The lattice rejected input that finalized blocks say is valid.
    #[error("lattice: {0}")]
    Lattice(eyre::Report),
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SyncerError {
    /// True for failures that mean local state or collaborators are broken
    /// and retrying the same call cannot help.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MismatchBlockHashSequence
                | Self::BrokenChain(_)
                | Self::MissingConfig(_)
                | Self::Lattice(_)
        )
    }
}
