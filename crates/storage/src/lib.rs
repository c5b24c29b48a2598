// SPDX-License-Identifier: MIT or Apache-2.0
//! Persistent storage for the finalized compaction chain.

mod stores;
pub use stores::*;
pub mod mem_db;

pub use wv_types::error::StoreError;

/// Convenience type to propagate store errors.
pub type StoreResult<T> = eyre::Result<T>;

/// The datastore column family names.
const BLOCKS_CF: &str = "blocks";
const CHAIN_TIP_CF: &str = "chain_tip";

macro_rules! tables {
    ( $($table:ident;$name:expr;<$K:ty, $V:ty>),*) => {
            $(
                #[derive(Debug)]
                pub struct $table {}
                impl wv_types::Table for $table {
                    type Key = $K;
                    type Value = $V;

                    const NAME: &'static str = $name;
                }
            )*
    };
}

pub mod tables {
    use wv_types::{Block, BlockHash, Height};

    tables!(
        Blocks;crate::BLOCKS_CF;<BlockHash, Block>,
        // Height-keyed so the newest tip is the last record.
        ChainTip;crate::CHAIN_TIP_CF;<Height, BlockHash>
    );
}
