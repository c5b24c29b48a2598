//! Canonical byte encoding shared by storage and digests.
//!
//! [`encode`] feeds block digests directly. The decode pair is the read half
//! of the [`Database`](crate::Database) contract: the serde bounds on its
//! keys and values exist so byte-oriented backends can round-trip records
//! through this codec, even though the in-memory store keeps values typed.

use serde::{de::DeserializeOwned, Serialize};

/// Encode a value into canonical bytes.
///
/// Serialization of our own well-formed types cannot fail; a failure here is
/// a bug, not a runtime condition.
pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bcs::to_bytes(value).expect("serialization of owned types cannot fail")
}

/// Decode bytes produced by [`encode`], panicking on malformed input.
///
/// Only for bytes this process wrote itself (storage round-trips); corrupt
/// storage is unrecoverable.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> T {
    bcs::from_bytes(bytes).expect("decoding bytes this process encoded")
}

/// Decode bytes of uncertain provenance.
pub fn try_decode<T: DeserializeOwned>(bytes: &[u8]) -> eyre::Result<T> {
    Ok(bcs::from_bytes(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, BlockHash, Position};

    #[test]
    fn round_trip() {
        let block = Block {
            hash: BlockHash::from_low_u64_be(7),
            position: Position::new(1, 2, 3),
            ..Default::default()
        };
        let bytes = encode(&block);
        assert_eq!(decode::<Block>(&bytes), block);
        assert_eq!(try_decode::<Block>(&bytes).unwrap(), block);
        assert!(try_decode::<Block>(&bytes[1..]).is_err());
    }
}
