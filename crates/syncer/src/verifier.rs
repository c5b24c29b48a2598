//! Threshold signature verification for randomness results.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use wv_types::{BlockHash, BlsPublicKey, BlsSignature, Governance, Round};

/// Verifies threshold randomness for one round against that round's group
/// public key.
#[derive(Clone, Copy, Debug)]
pub struct ThresholdVerifier {
    group_key: BlsPublicKey,
}

impl ThresholdVerifier {
    pub fn new(group_key: BlsPublicKey) -> Self {
        Self { group_key }
    }

    /// True when `signature` is the group's signature over `hash`.
    pub fn verify(&self, hash: BlockHash, signature: &BlsSignature) -> bool {
        signature.verify_raw(hash.as_ref(), &self.group_key)
    }
}

/// Cache of per-round [`ThresholdVerifier`]s over a sliding window of
/// rounds.
///
/// Group keys come out of each round's key setup, which completes some time
/// into the preceding round; until then lookups return `None` and the caller
/// retries later. The window keeps lookups for recent rounds from hitting
/// governance every time.
pub struct TsigVerifierCache<G> {
    governance: G,
    cache_rounds: usize,
    verifiers: Mutex<BTreeMap<Round, ThresholdVerifier>>,
}

impl<G: Governance> TsigVerifierCache<G> {
    pub fn new(governance: G, cache_rounds: usize) -> Self {
        Self { governance, cache_rounds, verifiers: Mutex::new(BTreeMap::new()) }
    }

    /// The verifier for `round`, fetching the group key from governance on a
    /// cache miss. `None` while the round's key setup is still running.
    pub fn update_and_get(&self, round: Round) -> Option<ThresholdVerifier> {
        let mut verifiers = self.verifiers.lock();
        if let Some(verifier) = verifiers.get(&round) {
            return Some(*verifier);
        }
        let group_key = self.governance.tsig_group_key(round)?;
        let verifier = ThresholdVerifier::new(group_key);
        verifiers.insert(round, verifier);

        // Drop rounds that fell out of the window.
        if let Some(&newest) = verifiers.keys().next_back() {
            let keep = self.cache_rounds.max(1) as Round;
            let floor = newest.saturating_sub(keep - 1);
            verifiers.retain(|r, _| *r >= floor);
        }
        Some(verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wv_test_utils::MockGovernance;
    use wv_types::BlsKeypair;

    #[test]
    fn verifier_accepts_group_signature_only() {
        let keypair = BlsKeypair::generate(&mut rand::rng());
        let verifier = ThresholdVerifier::new(keypair.public());
        let hash = BlockHash::from_low_u64_be(42);

        assert!(verifier.verify(hash, &keypair.sign(hash.as_ref())));
        assert!(!verifier.verify(BlockHash::from_low_u64_be(43), &keypair.sign(hash.as_ref())));

        let outsider = BlsKeypair::generate(&mut rand::rng());
        assert!(!verifier.verify(hash, &outsider.sign(hash.as_ref())));
    }

    #[test]
    fn lookup_is_none_until_key_setup_completes() {
        let governance = MockGovernance::new();
        let cache = TsigVerifierCache::new(governance.clone(), 7);
        assert!(cache.update_and_get(1).is_none());

        let keypair = BlsKeypair::generate(&mut rand::rng());
        governance.set_tsig_group_key(1, keypair.public());
        let verifier = cache.update_and_get(1).expect("key published");
        let hash = BlockHash::from_low_u64_be(1);
        assert!(verifier.verify(hash, &keypair.sign(hash.as_ref())));
    }

    #[test]
    fn cache_serves_hits_without_governance() {
        let governance = MockGovernance::new();
        let keypair = BlsKeypair::generate(&mut rand::rng());
        governance.set_tsig_group_key(2, keypair.public());

        let cache = TsigVerifierCache::new(governance.clone(), 7);
        assert!(cache.update_and_get(2).is_some());

        // Withdrawing the key must not invalidate the cached verifier.
        governance.clear_tsig_group_key(2);
        assert!(cache.update_and_get(2).is_some());
    }

    #[test]
    fn old_rounds_fall_out_of_the_window() {
        let governance = MockGovernance::new();
        let keypair = BlsKeypair::generate(&mut rand::rng());
        for round in 1..=5 {
            governance.set_tsig_group_key(round, keypair.public());
        }

        let cache = TsigVerifierCache::new(governance.clone(), 2);
        for round in 1..=5 {
            assert!(cache.update_and_get(round).is_some());
        }

        // Rounds 4 and 5 remain; 1 through 3 must re-fetch and fail now that
        // the keys are gone.
        for round in 1..=5 {
            governance.clear_tsig_group_key(round);
        }
        assert!(cache.update_and_get(5).is_some());
        assert!(cache.update_and_get(4).is_some());
        assert!(cache.update_and_get(3).is_none());
    }
}
