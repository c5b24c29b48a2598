//! The spawned loops a live syncer runs: inbound dispatch, round
//! monitoring, and the confirmed-block feed.

use crate::{agreement::AgreementInput, syncer::Inner};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{sync::mpsc::error::SendTimeoutError, task::JoinHandle};
use tracing::{debug, error, info, trace, warn};
use wv_types::{
    Database, Governance, LatticeBuilder, Notifier, RandomnessResult, Round, SyncMessage,
};

#[cfg(test)]
#[path = "tests/fabric_tests.rs"]
mod fabric_tests;

impl<DB: Database, G: Governance, B: LatticeBuilder> Inner<DB, G, B> {
    /// Start the feed loop: confirmed blocks out of the workers into the
    /// pending queues, pull requests out to the transport. Runs until both
    /// streams close, which [`crate::Syncer::stop`] arranges last.
    pub(crate) fn start_agreement(self: &Arc<Self>) {
        let Some((mut confirmed_rx, mut pull_rx)) = self.feed_rx.lock().take() else {
            return;
        };
        let inner = Arc::clone(self);
        self.feed_tasks.spawn_task("syncer-feed", async move {
            loop {
                tokio::select! {
                    block = confirmed_rx.recv() => {
                        let Some(block) = block else { return };
                        inner.enqueue_confirmed(block);
                    }
                    hash = pull_rx.recv() => {
                        let Some(hash) = hash else { return };
                        inner.network.pull_blocks(vec![hash]).await;
                    }
                }
            }
        });
    }

    /// Start the dispatcher: inbound messages to the right chain's worker,
    /// randomness to the cache, votes to the floor.
    pub(crate) fn start_network(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.fabric_tasks.spawn_task("syncer-dispatch", async move {
            let shutdown = inner.shutdown.subscribe();
            let node_shutdown = inner.config.shutdown().subscribe();
            let inbound = inner.network.inbound();
            // Holding the stream lock for the task's lifetime makes this the
            // sole consumer until stop.
            let mut inbound = inbound.lock().await;
            loop {
                let message = tokio::select! {
                    _ = &shutdown => return,
                    _ = &node_shutdown => return,
                    message = inbound.recv() => match message {
                        Some(message) => message,
                        None => return,
                    },
                };
                let input = match message {
                    SyncMessage::Block(block) => AgreementInput::Block(block),
                    SyncMessage::AgreementResult(result) => AgreementInput::Result(result),
                    SyncMessage::Randomness(result) => {
                        inner.cache_randomness(result);
                        continue;
                    }
                    // Agreement is not run while syncing; votes carry
                    // nothing for us.
                    SyncMessage::Vote(_) => continue,
                };
                let position = match &input {
                    AgreementInput::Block(block) => block.position,
                    AgreementInput::Result(result) => result.position,
                    AgreementInput::RoundReady(_) => continue,
                };
                let sender = {
                    let state = inner.state.read();
                    match state.workers.get(position.chain as usize) {
                        Some(sender) => sender.clone(),
                        None => {
                            error!(target: "syncer", %position, "message for unknown chain");
                            continue;
                        }
                    }
                };
                // Send outside the lock; a full worker channel must not
                // stall readers.
                if sender.send(input).await.is_err() {
                    debug!(target: "syncer", %position, "agreement worker gone; message dropped");
                }
            }
        });
    }

    /// Start the round monitor: poll governance for newly published common
    /// random seeds and release the matching rounds to every worker.
    pub(crate) fn start_crs_monitor(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        self.fabric_tasks.spawn_task("syncer-round-monitor", async move {
            let shutdown = inner.shutdown.subscribe();
            let node_shutdown = inner.config.shutdown().subscribe();
            let poll = inner.config.parameters().crs_poll_interval;
            let notify_timeout = inner.config.parameters().notify_timeout;
            let mut last_notified: Round = 0;
            loop {
                tokio::select! {
                    _ = &shutdown => return,
                    _ = &node_shutdown => return,
                    _ = tokio::time::sleep(poll) => {}
                }
                // Newest round whose seed is already published.
                let mut checked = last_notified + 1;
                while inner.config.governance().crs(checked).is_some() {
                    checked += 1;
                }
                checked -= 1;
                if checked <= last_notified {
                    continue;
                }
                if let Err(err) = inner.extend_configs_to(checked) {
                    error!(
                        target: "syncer",
                        round = checked,
                        %err,
                        "cannot extend configs for a published seed; round monitor giving up"
                    );
                    return;
                }
                debug!(target: "syncer", round = checked, "common random seed is ready");
                last_notified = checked;
                let workers = inner.state.read().workers.clone();
                for (chain, sender) in workers.iter().enumerate() {
                    loop {
                        tokio::select! {
                            _ = &shutdown => return,
                            sent = sender.send_timeout(
                                AgreementInput::RoundReady(checked),
                                notify_timeout,
                            ) => match sent {
                                Ok(()) => break,
                                Err(SendTimeoutError::Timeout(_)) => {
                                    warn!(
                                        target: "syncer",
                                        chain,
                                        round = checked,
                                        "agreement input channel is full when putting CRS"
                                    );
                                }
                                Err(SendTimeoutError::Closed(_)) => break,
                            }
                        }
                    }
                }
            }
        });
    }

    /// Verify and cache one randomness result. Invalid or premature results
    /// are dropped where they stand.
    pub(crate) fn cache_randomness(&self, result: RandomnessResult) {
        // Round 0 has no randomness by construction.
        if result.position.round == 0 {
            return;
        }
        {
            let state = self.state.read();
            if result.position.round < state.agreement_cut {
                return;
            }
            if state.randomness.contains_key(&result.block_hash) {
                return;
            }
        }
        let Some(verifier) = self.verifier_cache.update_and_get(result.position.round) else {
            warn!(
                target: "syncer",
                position = %result.position,
                "threshold key not ready; dropping randomness"
            );
            return;
        };
        if !verifier.verify(result.block_hash, &result.randomness) {
            info!(
                target: "syncer",
                position = %result.position,
                block = %result.block_hash,
                "block randomness is not valid"
            );
            return;
        }
        self.state.write().randomness.insert(result.block_hash, result);
    }

    /// After stop, keep draining the inbound stream into a buffer so no
    /// message is lost between sync completion and handoff.
    pub(crate) fn launch_dummy_receiver(self: &Arc<Self>) {
        let cancel = Notifier::new();
        let cancelled = cancel.subscribe();
        let buffer: Arc<Mutex<Vec<SyncMessage>>> = Arc::new(Mutex::new(Vec::new()));
        let inbound = self.network.inbound();
        let sink = Arc::clone(&buffer);
        let handle = tokio::spawn(async move {
            let mut inbound = inbound.lock().await;
            loop {
                tokio::select! {
                    _ = &cancelled => return,
                    message = inbound.recv() => match message {
                        Some(message) => sink.lock().push(message),
                        None => return,
                    },
                }
            }
        });
        trace!(target: "syncer", "buffering receiver launched");
        *self.dummy.lock() = Some(DummyReceiver { cancel, buffer, handle });
    }
}

/// Handle to the task buffering inbound traffic between stop and handoff.
pub(crate) struct DummyReceiver {
    cancel: Notifier,
    buffer: Arc<Mutex<Vec<SyncMessage>>>,
    handle: JoinHandle<()>,
}

impl DummyReceiver {
    /// Stop buffering and take everything captured, in arrival order.
    pub(crate) async fn finish(self) -> Vec<SyncMessage> {
        self.cancel.notify();
        if let Err(err) = self.handle.await {
            error!(target: "syncer", ?err, "buffering receiver panicked");
        }
        std::mem::take(&mut *self.buffer.lock())
    }
}
