//! The seam between the sync layer and the node's transport.

use std::{fmt, sync::Arc};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;
use wv_types::{BlockHash, SyncMessage};

/// Requests the sync layer issues to the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkCommand {
    /// Fetch these blocks from peers. Responses come back through the
    /// inbound stream as ordinary [`SyncMessage::Block`]s.
    PullBlocks { hashes: Vec<BlockHash> },
}

/// The sync layer's half of the transport seam.
///
/// Inbound messages are a single stream behind a lock so exactly one
/// consumer drains it at a time; the dispatcher while syncing, the buffering
/// receiver between stop and handoff, and the next owner after that.
#[derive(Clone)]
pub struct SyncNetwork {
    inbound: Arc<Mutex<mpsc::Receiver<SyncMessage>>>,
    commands: mpsc::Sender<NetworkCommand>,
}

impl SyncNetwork {
    /// Create a connected pair: the syncer's half and the transport's half.
    pub fn pair(capacity: usize) -> (Self, NetworkHandle) {
        let (message_tx, message_rx) = mpsc::channel(capacity);
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let network =
            Self { inbound: Arc::new(Mutex::new(message_rx)), commands: command_tx };
        let handle = NetworkHandle { messages: message_tx, commands: command_rx };
        (network, handle)
    }

    /// Handle to the inbound stream. The caller locks it for as long as it
    /// is the stream's consumer.
    pub(crate) fn inbound(&self) -> Arc<Mutex<mpsc::Receiver<SyncMessage>>> {
        Arc::clone(&self.inbound)
    }

    /// Ask the transport to fetch blocks by hash.
    pub async fn pull_blocks(&self, hashes: Vec<BlockHash>) {
        if self.commands.send(NetworkCommand::PullBlocks { hashes }).await.is_err() {
            debug!(target: "syncer", "transport gone; dropping pull request");
        }
    }
}

impl fmt::Debug for SyncNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncNetwork").finish_non_exhaustive()
    }
}

/// The transport's half of the seam: push inbound messages in, service
/// commands out.
pub struct NetworkHandle {
    messages: mpsc::Sender<SyncMessage>,
    commands: mpsc::Receiver<NetworkCommand>,
}

impl NetworkHandle {
    /// Deliver one inbound message. Returns false once the syncer side is
    /// gone.
    pub async fn deliver(&self, message: SyncMessage) -> bool {
        self.messages.send(message).await.is_ok()
    }

    /// Next command from the sync layer; `None` once it shut down.
    pub async fn next_command(&mut self) -> Option<NetworkCommand> {
        self.commands.recv().await
    }

    /// Non-blocking variant of [`Self::next_command`] for tests and polling
    /// transports.
    pub fn try_next_command(&mut self) -> Option<NetworkCommand> {
        self.commands.try_recv().ok()
    }
}

impl fmt::Debug for NetworkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkHandle").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wv_types::{Block, Position};

    #[tokio::test]
    async fn pull_request_reaches_the_transport() {
        let (network, mut handle) = SyncNetwork::pair(8);
        let hash = BlockHash::from_low_u64_be(7);
        network.pull_blocks(vec![hash]).await;

        let command = handle.next_command().await.expect("command delivered");
        assert_eq!(command, NetworkCommand::PullBlocks { hashes: vec![hash] });
    }

    #[tokio::test]
    async fn inbound_messages_round_trip() {
        let (network, handle) = SyncNetwork::pair(8);
        let block = Block { position: Position::new(0, 1, 2), ..Default::default() };
        assert!(handle.deliver(SyncMessage::Block(Box::new(block.clone()))).await);

        let inbound = network.inbound();
        let mut inbound = inbound.lock().await;
        match inbound.recv().await.expect("message delivered") {
            SyncMessage::Block(received) => assert_eq!(*received, block),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn pull_after_transport_drop_is_silent() {
        let (network, handle) = SyncNetwork::pair(8);
        drop(handle);
        // Must not error or panic; the request is simply dropped.
        network.pull_blocks(vec![BlockHash::ZERO]).await;
    }
}
