//! An in-memory governance stub with test-controlled publication.

use parking_lot::Mutex;
use std::{collections::BTreeMap, sync::Arc};
use wv_types::{BlsPublicKey, Crs, Governance, Round, RoundConfig};

#[derive(Default)]
struct Published {
    configs: BTreeMap<Round, RoundConfig>,
    seeds: BTreeMap<Round, Crs>,
    tsig_keys: BTreeMap<Round, BlsPublicKey>,
}

/// Governance whose published rounds, seeds, and group keys are set by the
/// test as it goes, so availability ordering can be scripted.
#[derive(Clone, Default)]
pub struct MockGovernance {
    published: Arc<Mutex<Published>>,
}

impl MockGovernance {
    /// Governance with nothing published, not even round 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Governance where rounds `0..=through` all share `config`.
    pub fn with_uniform_rounds(config: RoundConfig, through: Round) -> Self {
        let governance = Self::new();
        governance.publish_through(through, config);
        governance
    }

    /// Publish one round's configuration, replacing any previous value.
    pub fn publish(&self, round: Round, config: RoundConfig) {
        self.published.lock().configs.insert(round, config);
    }

    /// Publish `config` for every round up to and including `through`.
    pub fn publish_through(&self, through: Round, config: RoundConfig) {
        let mut published = self.published.lock();
        for round in 0..=through {
            published.configs.insert(round, config.clone());
        }
    }

    /// Mark `round`'s common random seed available, with a value derived
    /// from the round number.
    pub fn publish_crs(&self, round: Round) {
        let seed = *blake3::hash(&round.to_le_bytes()).as_bytes();
        self.published.lock().seeds.insert(round, seed);
    }

    pub fn set_tsig_group_key(&self, round: Round, key: BlsPublicKey) {
        self.published.lock().tsig_keys.insert(round, key);
    }

    pub fn clear_tsig_group_key(&self, round: Round) {
        self.published.lock().tsig_keys.remove(&round);
    }
}

impl Governance for MockGovernance {
    fn round_config(&self, round: Round) -> Option<RoundConfig> {
        self.published.lock().configs.get(&round).cloned()
    }

    fn crs(&self, round: Round) -> Option<Crs> {
        self.published.lock().seeds.get(&round).copied()
    }

    fn tsig_group_key(&self, round: Round) -> Option<BlsPublicKey> {
        self.published.lock().tsig_keys.get(&round).copied()
    }
}
