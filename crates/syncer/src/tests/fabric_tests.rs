//! Tests for the spawned loops.

use crate::{
    network::{NetworkHandle, SyncNetwork},
    syncer::Syncer,
};
use std::time::Duration;
use wv_storage::mem_db::MemDatabase;
use wv_test_utils::{random_keypair, test_syncer_config, MockGovernance, MockLatticeBuilder};
use wv_types::{
    AgreementResult, Block, BlockHash, ChainId, Height, Position, RandomnessResult, Round,
    RoundConfig, SyncMessage, Vote,
};

type TestSyncer = Syncer<MemDatabase, MockGovernance, MockLatticeBuilder>;

fn make_syncer(
    num_chains: u32,
    rounds_through: Round,
) -> (TestSyncer, NetworkHandle, MockGovernance) {
    let config = RoundConfig { num_chains, ..RoundConfig::default() };
    let governance = MockGovernance::with_uniform_rounds(config, rounds_through);
    let (network, handle) = SyncNetwork::pair(64);
    let syncer = Syncer::new(
        test_syncer_config(MemDatabase::default(), governance.clone(), 0),
        network,
        MockLatticeBuilder::immediate(),
    )
    .expect("round 0 config published");
    (syncer, handle, governance)
}

async fn wait_until(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

fn empty_block_message(round: Round, chain: ChainId, height: Height) -> SyncMessage {
    SyncMessage::Block(Box::new(Block {
        position: Position::new(round, chain, height),
        ..Default::default()
    }))
}

#[tokio::test]
async fn dispatcher_routes_messages_to_the_right_worker() {
    let (syncer, handle, _) = make_syncer(2, 4);
    let inner = syncer.inner();
    inner.resize_chains(2);
    inner.start_agreement();
    inner.start_network();

    // Votes carry nothing for the sync layer and must not jam dispatch.
    let vote = SyncMessage::Vote(Vote {
        block_hash: BlockHash::ZERO,
        position: Position::new(0, 0, 0),
        signature: Default::default(),
    });
    assert!(handle.deliver(vote).await);

    // An empty block confirms instantly, so routing becomes visible in the
    // pending queues.
    assert!(handle.deliver(empty_block_message(0, 1, 0)).await);
    wait_until("chain 1 confirms the placeholder", || {
        inner.state.read().pending[1].len() == 1
    })
    .await;
    assert!(inner.state.read().pending[0].is_empty());
}

#[tokio::test]
async fn messages_for_unknown_chains_are_dropped() {
    let (syncer, handle, _) = make_syncer(2, 4);
    let inner = syncer.inner();
    inner.resize_chains(2);
    inner.start_agreement();
    inner.start_network();

    assert!(handle.deliver(empty_block_message(0, 5, 0)).await);
    // A later valid message proves the dispatcher survived.
    assert!(handle.deliver(empty_block_message(0, 0, 0)).await);
    wait_until("chain 0 confirms the placeholder", || {
        inner.state.read().pending[0].len() == 1
    })
    .await;
    assert_eq!(inner.state.read().pending.len(), 2);
}

#[test]
fn randomness_is_verified_before_caching() {
    let (syncer, _handle, governance) = make_syncer(2, 4);
    let inner = syncer.inner();
    let keypair = random_keypair();
    governance.set_tsig_group_key(1, keypair.public());

    let hash = BlockHash::from_low_u64_be(77);
    let good = RandomnessResult {
        block_hash: hash,
        position: Position::new(1, 0, 3),
        randomness: keypair.sign(hash.as_ref()),
    };
    inner.cache_randomness(good);
    assert!(inner.state.read().randomness.contains_key(&hash));

    // A signature over different bytes does not verify.
    let other = BlockHash::from_low_u64_be(78);
    let forged = RandomnessResult {
        block_hash: other,
        position: Position::new(1, 0, 4),
        randomness: keypair.sign(b"something else"),
    };
    inner.cache_randomness(forged);
    assert!(!inner.state.read().randomness.contains_key(&other));
}

#[test]
fn premature_or_stale_randomness_is_dropped() {
    let (syncer, _handle, governance) = make_syncer(2, 4);
    let inner = syncer.inner();
    let keypair = random_keypair();
    governance.set_tsig_group_key(3, keypair.public());

    let signed = |hash: BlockHash, round| RandomnessResult {
        block_hash: hash,
        position: Position::new(round, 0, 1),
        randomness: keypair.sign(hash.as_ref()),
    };

    // Round 0 has no randomness by construction.
    inner.cache_randomness(signed(BlockHash::from_low_u64_be(1), 0));
    // No group key published for round 2 yet.
    inner.cache_randomness(signed(BlockHash::from_low_u64_be(2), 2));
    // Rounds below the agreement cut are history already.
    inner.state.write().agreement_cut = 4;
    inner.cache_randomness(signed(BlockHash::from_low_u64_be(3), 3));
    assert!(inner.state.read().randomness.is_empty());
}

#[tokio::test]
async fn round_monitor_releases_parked_rounds() {
    let (syncer, handle, governance) = make_syncer(2, 4);
    let inner = syncer.inner();
    inner.resize_chains(2);
    inner.start_agreement();
    inner.start_network();
    inner.start_crs_monitor();

    // A round-2 result parks until its seed is published.
    let parked = SyncMessage::AgreementResult(AgreementResult {
        block_hash: BlockHash::ZERO,
        position: Position::new(2, 0, 6),
        is_empty_block: true,
    });
    assert!(handle.deliver(parked).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(inner.state.read().pending[0].is_empty());

    governance.publish_crs(1);
    governance.publish_crs(2);
    wait_until("the seed releases the parked result", || {
        inner.state.read().pending[0].len() == 1
    })
    .await;
}

#[tokio::test]
async fn dispatch_loops_exit_on_shutdown() {
    let (syncer, _handle, _) = make_syncer(2, 4);
    let inner = syncer.inner();
    inner.start_network();
    inner.start_crs_monitor();

    inner.shutdown.notify();
    tokio::time::timeout(Duration::from_secs(2), inner.fabric_tasks.join_all())
        .await
        .expect("loops wind down once notified");
}

#[tokio::test]
async fn round_monitor_gives_up_without_configs() {
    let governance = MockGovernance::new();
    governance.publish(0, RoundConfig::default());
    let (network, _handle) = SyncNetwork::pair(8);
    let syncer: TestSyncer = Syncer::new(
        test_syncer_config(MemDatabase::default(), governance.clone(), 0),
        network,
        MockLatticeBuilder::immediate(),
    )
    .expect("round 0 config published");
    let inner = syncer.inner();
    inner.start_crs_monitor();

    // A seed for a round whose config was never published stops the monitor.
    governance.publish_crs(1);
    tokio::time::timeout(Duration::from_secs(2), inner.fabric_tasks.join_all())
        .await
        .expect("monitor exits");
}

#[tokio::test]
async fn buffered_traffic_survives_until_handoff() {
    let (syncer, handle, _) = make_syncer(2, 4);
    let inner = syncer.inner();
    inner.launch_dummy_receiver();

    assert!(handle.deliver(empty_block_message(0, 0, 7)).await);
    assert!(handle.deliver(empty_block_message(0, 1, 8)).await);

    let receiver = inner.dummy.lock().take().expect("receiver launched");
    wait_until("the receiver buffers both messages", || receiver.buffer.lock().len() == 2)
        .await;
    let buffered = receiver.finish().await;
    let positions: Vec<_> = buffered
        .iter()
        .map(|message| message.position().expect("blocks carry positions"))
        .collect();
    assert_eq!(positions, vec![Position::new(0, 0, 7), Position::new(0, 1, 8)]);
}
