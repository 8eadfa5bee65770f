//! Classical message transport contract.
//!
//! Every participant (the controller and each compute node) owns one
//! [`Transport`] endpoint obtained from a shared [`TransportHub`]. Delivery
//! is point-to-point and ordered per sender; `send` returns once the message
//! has been accepted by the receiver's mailbox.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use qdist_ir::{BitId, NodeId};

use crate::error::HalResult;

/// A classical message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// A classical bit produced by a measurement.
    Bit {
        /// Bit id.
        id: BitId,
        /// Bit value, 0 or 1.
        value: u8,
    },
    /// Serialized schedule assignment broadcast by the controller.
    Schedule {
        /// JSON payload.
        payload: String,
    },
    /// Acknowledgment of a schedule.
    Ack,
    /// Serialized end-of-run report from a node.
    Report {
        /// Clock epoch of the reported run.
        epoch: u64,
        /// JSON payload.
        payload: String,
    },
    /// Ask a node to stop serving.
    Shutdown,
}

/// A participant's message endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Id of the participant owning this endpoint.
    fn local_id(&self) -> &NodeId;

    /// Deliver `message` to `to`.
    async fn send(&self, to: &NodeId, message: Message) -> HalResult<()>;

    /// Take the next message sent by `from`, waiting at most `timeout`.
    /// Returns `None` on timeout.
    async fn receive(&self, from: &NodeId, timeout: Duration) -> HalResult<Option<Message>>;

    /// Deliver `message` to every other endpoint. Returns the number of
    /// receivers.
    async fn broadcast(&self, message: Message) -> HalResult<usize>;

    /// Take one message from each of `peers` within a shared deadline.
    ///
    /// Peers that stay silent map to `None`.
    async fn gather(
        &self,
        peers: &[NodeId],
        timeout: Duration,
    ) -> HalResult<Vec<(NodeId, Option<Message>)>> {
        let deadline = Instant::now() + timeout;
        let mut collected = Vec::with_capacity(peers.len());
        for peer in peers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let message = self.receive(peer, remaining).await?;
            if message.is_none() {
                tracing::warn!("No message from {} before deadline", peer);
            }
            collected.push((peer.clone(), message));
        }
        Ok(collected)
    }
}

/// Factory for connected endpoints.
pub trait TransportHub: Send + Sync {
    /// Register `id` and return its endpoint.
    fn connect(&self, id: &NodeId) -> HalResult<Arc<dyn Transport>>;
}
