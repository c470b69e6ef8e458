//! Pending-request table: correlates in-flight webhooks with tunnel
//! responses.
//!
//! Each entry is a single-shot, single-consumer rendezvous. The producer
//! (the tunnel demux loop) never blocks: delivery to an absent or
//! already-cancelled entry drops the payload. The consumer deregisters
//! through a drop guard, so cancellation (timeout, client gone) cleans
//! up exactly once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
pub struct PendingRequests {
    inner: Mutex<HashMap<String, oneshot::Sender<Vec<u8>>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, oneshot::Sender<Vec<u8>>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Registers a rendezvous for `req_id`. The returned ticket removes
    /// the entry when dropped.
    pub fn register(self: &Arc<Self>, req_id: &str) -> PendingTicket {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(req_id.to_owned(), tx);
        PendingTicket {
            req_id: req_id.to_owned(),
            table: Arc::clone(self),
            rx,
        }
    }

    /// Hands response bytes to the waiting consumer. A payload for an
    /// unknown id or a gone consumer is dropped.
    pub fn deliver(&self, req_id: &str, payload: Vec<u8>) {
        let sender = self.lock().remove(req_id);
        match sender {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    debug!(req_id, "response dropped: consumer cancelled");
                }
            }
            None => debug!(req_id, "response dropped: unknown request id"),
        }
    }

    fn cancel(&self, req_id: &str) {
        self.lock().remove(req_id);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Consumer handle for one rendezvous.
#[derive(Debug)]
pub struct PendingTicket {
    req_id: String,
    table: Arc<PendingRequests>,
    rx: oneshot::Receiver<Vec<u8>>,
}

impl PendingTicket {
    pub fn req_id(&self) -> &str {
        &self.req_id
    }

    /// The receive future, usable inside `select!`.
    pub fn recv(&mut self) -> &mut oneshot::Receiver<Vec<u8>> {
        &mut self.rx
    }
}

impl Drop for PendingTicket {
    fn drop(&mut self) {
        self.table.cancel(&self.req_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_reaches_the_consumer() {
        let table = Arc::new(PendingRequests::new());
        let mut ticket = table.register("r1");

        table.deliver("r1", b"response".to_vec());
        assert_eq!(ticket.recv().await.unwrap(), b"response");
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn deliver_to_unknown_id_is_a_noop() {
        let table = Arc::new(PendingRequests::new());
        table.deliver("ghost", b"dropped".to_vec());
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn dropping_the_ticket_deregisters() {
        let table = Arc::new(PendingRequests::new());
        {
            let _ticket = table.register("r1");
            assert_eq!(table.len(), 1);
        }
        assert!(table.is_empty());

        // A late delivery after cancellation is dropped silently.
        table.deliver("r1", b"late".to_vec());
    }

    #[tokio::test]
    async fn second_delivery_is_dropped() {
        let table = Arc::new(PendingRequests::new());
        let mut ticket = table.register("r1");

        table.deliver("r1", b"first".to_vec());
        table.deliver("r1", b"second".to_vec());
        assert_eq!(ticket.recv().await.unwrap(), b"first");
    }

    #[tokio::test]
    async fn entries_are_independent() {
        let table = Arc::new(PendingRequests::new());
        let mut t1 = table.register("r1");
        let mut t2 = table.register("r2");

        table.deliver("r2", b"two".to_vec());
        table.deliver("r1", b"one".to_vec());

        assert_eq!(t1.recv().await.unwrap(), b"one");
        assert_eq!(t2.recv().await.unwrap(), b"two");
    }
}
