//! BLS12-381 primitives backing threshold randomness verification.

use blst::min_sig::{
    PublicKey as CorePublicKey, SecretKey as CoreSecretKey, Signature as CoreSignature,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref};

/// Domain separation tag for signatures over the G1 group (min-sig scheme).
pub const DST_G1: &[u8] = b"BLS_SIG_BLS12381G1_XMD:SHA-256_SSWU_RO_POP_";

/// Hash function used for content digests.
pub type DefaultHashFunction = blake3::Hasher;

/// A BLS public key on G2. For threshold randomness this is the group public
/// key produced by the round's DKG.
#[derive(Clone, Copy)]
pub struct BlsPublicKey(CorePublicKey);

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bytes() == other.0.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

impl BlsPublicKey {
    pub fn from_bytes(bytes: &[u8]) -> eyre::Result<Self> {
        let pk = CorePublicKey::from_bytes(bytes)
            .map_err(|_| eyre::eyre!("invalid public key bytes"))?;
        Ok(Self(pk))
    }

    pub fn to_bytes(&self) -> [u8; 96] {
        self.0.to_bytes()
    }
}

impl Deref for BlsPublicKey {
    type Target = CorePublicKey;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<CorePublicKey> for BlsPublicKey {
    fn from(value: CorePublicKey) -> Self {
        Self(value)
    }
}

impl fmt::Debug for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Display for BlsPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let full = hex::encode(self.0.to_bytes());
        write!(f, "{}", full.get(0..16).ok_or(fmt::Error)?)
    }
}

/// A BLS signature on G1.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct BlsSignature(CoreSignature);

impl BlsSignature {
    pub fn from_bytes(bytes: &[u8]) -> eyre::Result<Self> {
        let sig = CoreSignature::from_bytes(bytes)
            .map_err(|_| eyre::eyre!("invalid signature bytes"))?;
        Ok(Self(sig))
    }

    pub fn to_bytes(&self) -> [u8; 48] {
        self.0.to_bytes()
    }

    /// Verify over raw message bytes with `public_key`.
    pub fn verify_raw(&self, message: &[u8], public_key: &BlsPublicKey) -> bool {
        self.0.verify(true, message, DST_G1, &[], public_key, true)
            == blst::BLST_ERROR::BLST_SUCCESS
    }
}

impl Deref for BlsSignature {
    type Target = CoreSignature;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<CoreSignature> for BlsSignature {
    fn from(value: CoreSignature) -> Self {
        Self(value)
    }
}

impl fmt::Debug for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", hex::encode(self.0.to_bytes()))
    }
}

impl fmt::Display for BlsSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let full = hex::encode(self.0.to_bytes());
        write!(f, "{}", full.get(0..16).ok_or(fmt::Error)?)
    }
}

impl Default for BlsSignature {
    /// The infinity point in compressed form.
    /// See https://github.com/supranational/blst#serialization-format
    fn default() -> Self {
        let mut infinity = [0_u8; 48];
        infinity[0] = 0xc0;

        BlsSignature::from_bytes(&infinity).expect("decode infinity signature")
    }
}

/// A signing keypair. The sync layer itself never signs; keypairs exist so
/// collaborators and tests can produce verifiable randomness.
pub struct BlsKeypair {
    secret: CoreSecretKey,
}

impl BlsKeypair {
    /// Generate a fresh keypair from `rng`.
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        let mut ikm = [0_u8; 32];
        rng.fill_bytes(&mut ikm);
        let secret = CoreSecretKey::key_gen(&ikm, &[]).expect("ikm length is fixed");
        Self { secret }
    }

    pub fn public(&self) -> BlsPublicKey {
        BlsPublicKey(self.secret.sk_to_pk())
    }

    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST_G1, &[]))
    }
}

impl fmt::Debug for BlsKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "BlsKeypair({})", self.public())
    }
}

// ----- Serde implementations -----

impl Serialize for BlsSignature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&hex::encode(self.0.to_bytes()))
        } else {
            serializer.serialize_bytes(&self.0.to_bytes())
        }
    }
}

impl<'de> Deserialize<'de> for BlsSignature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::*;

        struct BlsSignatureVisitor;

        impl Visitor<'_> for BlsSignatureVisitor {
            type Value = BlsSignature;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "valid bls signature bytes")
            }

            fn visit_bytes<E>(self, v: &[u8]) -> Result<Self::Value, E>
            where
                E: Error,
            {
                // Deserialize through blst so only valid points get through.
                let sig = CoreSignature::from_bytes(v)
                    .map_err(|_| Error::invalid_value(Unexpected::Bytes(v), &self))?;
                Ok(sig.into())
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: Error,
            {
                let bytes =
                    hex::decode(v).map_err(|_| Error::invalid_value(Unexpected::Str(v), &self))?;
                self.visit_bytes(&bytes)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(BlsSignatureVisitor)
        } else {
            deserializer.deserialize_bytes(BlsSignatureVisitor)
        }
    }
}
