//! In-process transport.
//!
//! Every endpoint owns a mailbox with one FIFO queue per sender. Sending
//! pushes onto the receiver's queue for the sender and wakes the receiver;
//! receiving waits on the queue of one given sender.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{Instant, timeout_at};
use tracing::trace;

use qdist_hal::{HalError, HalResult, Message, Transport, TransportHub};
use qdist_ir::NodeId;

#[derive(Default)]
struct Mailbox {
    queues: Mutex<FxHashMap<NodeId, VecDeque<Message>>>,
    arrived: Notify,
}

impl Mailbox {
    fn push(&self, from: &NodeId, message: Message) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(from.clone())
            .or_default()
            .push_back(message);
        self.arrived.notify_waiters();
    }

    fn pop(&self, from: &NodeId) -> Option<Message> {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(from)
            .and_then(VecDeque::pop_front)
    }
}

#[derive(Default)]
struct HubInner {
    mailboxes: Mutex<BTreeMap<NodeId, Arc<Mailbox>>>,
    closed: AtomicBool,
}

impl HubInner {
    fn mailbox(&self, id: &NodeId) -> HalResult<Arc<Mailbox>> {
        self.mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| HalError::UnknownEndpoint(id.clone()))
    }
}

/// Hub handing out endpoints that deliver through shared memory.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<HubInner>,
}

impl InMemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of the connected endpoints.
    pub fn endpoints(&self) -> Vec<NodeId> {
        self.inner
            .mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Refuse all further sends.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
    }
}

impl TransportHub for InMemoryHub {
    fn connect(&self, id: &NodeId) -> HalResult<Arc<dyn Transport>> {
        let mut mailboxes = self
            .inner
            .mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if mailboxes.contains_key(id) {
            return Err(HalError::DuplicateEndpoint(id.clone()));
        }
        let mailbox = Arc::new(Mailbox::default());
        mailboxes.insert(id.clone(), mailbox.clone());
        Ok(Arc::new(ChannelEndpoint {
            id: id.clone(),
            mailbox,
            hub: self.inner.clone(),
        }))
    }
}

/// Endpoint connected to an [`InMemoryHub`].
pub struct ChannelEndpoint {
    id: NodeId,
    mailbox: Arc<Mailbox>,
    hub: Arc<HubInner>,
}

#[async_trait]
impl Transport for ChannelEndpoint {
    fn local_id(&self) -> &NodeId {
        &self.id
    }

    async fn send(&self, to: &NodeId, message: Message) -> HalResult<()> {
        if self.hub.closed.load(Ordering::SeqCst) {
            return Err(HalError::Closed);
        }
        trace!("{} -> {}: {:?}", self.id, to, message);
        self.hub.mailbox(to)?.push(&self.id, message);
        Ok(())
    }

    async fn receive(&self, from: &NodeId, timeout: Duration) -> HalResult<Option<Message>> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.mailbox.arrived.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed.
            notified.as_mut().enable();

            if let Some(message) = self.mailbox.pop(from) {
                return Ok(Some(message));
            }
            if timeout_at(deadline, notified).await.is_err() {
                return Ok(self.mailbox.pop(from));
            }
        }
    }

    async fn broadcast(&self, message: Message) -> HalResult<usize> {
        if self.hub.closed.load(Ordering::SeqCst) {
            return Err(HalError::Closed);
        }
        let targets: Vec<Arc<Mailbox>> = self
            .hub
            .mailboxes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| **id != self.id)
            .map(|(_, mailbox)| mailbox.clone())
            .collect();
        for mailbox in &targets {
            mailbox.push(&self.id, message.clone());
        }
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdist_ir::BitId;

    fn bit(value: u8) -> Message {
        Message::Bit {
            id: BitId::from("m"),
            value,
        }
    }

    #[tokio::test]
    async fn test_per_sender_fifo() {
        let hub = InMemoryHub::new();
        let a = hub.connect(&NodeId::from("A")).unwrap();
        let b = hub.connect(&NodeId::from("B")).unwrap();
        let c = hub.connect(&NodeId::from("C")).unwrap();

        a.send(&NodeId::from("C"), bit(0)).await.unwrap();
        b.send(&NodeId::from("C"), bit(1)).await.unwrap();
        a.send(&NodeId::from("C"), bit(1)).await.unwrap();

        let wait = Duration::from_millis(10);
        assert_eq!(c.receive(&NodeId::from("B"), wait).await.unwrap(), Some(bit(1)));
        assert_eq!(c.receive(&NodeId::from("A"), wait).await.unwrap(), Some(bit(0)));
        assert_eq!(c.receive(&NodeId::from("A"), wait).await.unwrap(), Some(bit(1)));
        assert_eq!(c.receive(&NodeId::from("A"), wait).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_late_send() {
        let hub = InMemoryHub::new();
        let a = hub.connect(&NodeId::from("A")).unwrap();
        let b = hub.connect(&NodeId::from("B")).unwrap();

        let waiter = tokio::spawn(async move {
            b.receive(&NodeId::from("A"), Duration::from_secs(5)).await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        a.send(&NodeId::from("B"), Message::Ack).await.unwrap();

        assert_eq!(waiter.await.unwrap().unwrap(), Some(Message::Ack));
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = InMemoryHub::new();
        let ctl = hub.connect(&NodeId::from("controller")).unwrap();
        let a = hub.connect(&NodeId::from("A")).unwrap();
        hub.connect(&NodeId::from("B")).unwrap();

        assert_eq!(ctl.broadcast(Message::Shutdown).await.unwrap(), 2);
        let wait = Duration::from_millis(10);
        assert_eq!(
            a.receive(&NodeId::from("controller"), wait).await.unwrap(),
            Some(Message::Shutdown)
        );
        assert_eq!(
            ctl.receive(&NodeId::from("controller"), wait).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_connect_and_close_errors() {
        let hub = InMemoryHub::new();
        let a = hub.connect(&NodeId::from("A")).unwrap();
        assert!(matches!(
            hub.connect(&NodeId::from("A")),
            Err(HalError::DuplicateEndpoint(_))
        ));
        assert!(matches!(
            a.send(&NodeId::from("Z"), Message::Ack).await,
            Err(HalError::UnknownEndpoint(_))
        ));
        hub.close();
        assert!(matches!(
            a.send(&NodeId::from("A"), Message::Ack).await,
            Err(HalError::Closed)
        ));
        assert_eq!(hub.endpoints(), [NodeId::from("A")]);
    }
}
