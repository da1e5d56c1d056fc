//! FIFO flush coordinator.
//!
//! Every outbound PING enqueues a waiter; the transport acknowledges PINGs
//! in order, so each inbound PONG resolves exactly the oldest waiter. The
//! drain sequence reuses the same queue with a barrier entry so it can tell
//! when its own PING has round-tripped.

use crate::error::{RelayLinkError, Result};
use std::collections::VecDeque;
use tokio::sync::oneshot;

pub(crate) enum FlushWaiter {
    /// A `flush()` caller awaiting its PONG.
    User(oneshot::Sender<Result<()>>),
    /// The drain sequence's round-trip marker.
    DrainBarrier,
}

#[derive(Default)]
pub(crate) struct FlushQueue {
    waiters: VecDeque<FlushWaiter>,
}

impl FlushQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_user(&mut self, tx: oneshot::Sender<Result<()>>) {
        self.waiters.push_back(FlushWaiter::User(tx));
    }

    pub(crate) fn push_barrier(&mut self) {
        self.waiters.push_back(FlushWaiter::DrainBarrier);
    }

    /// Pop the oldest waiter for an inbound PONG. `None` means the PONG was
    /// unsolicited (e.g. answering a keepalive) and should be ignored.
    pub(crate) fn acknowledge(&mut self) -> Option<FlushWaiter> {
        self.waiters.pop_front()
    }

    /// Fail every outstanding waiter; used when the connection closes with
    /// PINGs still unacknowledged.
    pub(crate) fn fail_all(&mut self) {
        for waiter in self.waiters.drain(..) {
            if let FlushWaiter::User(tx) = waiter {
                let _ = tx.send(Err(RelayLinkError::ConnectionClosed));
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pongs_resolve_oldest_first() {
        let mut queue = FlushQueue::new();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        queue.push_user(tx1);
        queue.push_user(tx2);

        match queue.acknowledge() {
            Some(FlushWaiter::User(tx)) => tx.send(Ok(())).unwrap(),
            _ => panic!("expected the first user waiter"),
        }
        assert!(rx1.try_recv().unwrap().is_ok());
        assert!(rx2.try_recv().is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_barrier_keeps_fifo_position() {
        let mut queue = FlushQueue::new();
        let (tx, _rx) = oneshot::channel();
        queue.push_user(tx);
        queue.push_barrier();

        assert!(matches!(queue.acknowledge(), Some(FlushWaiter::User(_))));
        assert!(matches!(queue.acknowledge(), Some(FlushWaiter::DrainBarrier)));
        assert!(queue.acknowledge().is_none());
    }

    #[tokio::test]
    async fn test_fail_all_rejects_user_waiters() {
        let mut queue = FlushQueue::new();
        let (tx, rx) = oneshot::channel();
        queue.push_user(tx);
        queue.push_barrier();
        queue.fail_all();

        assert!(matches!(
            rx.await.unwrap(),
            Err(RelayLinkError::ConnectionClosed)
        ));
        assert_eq!(queue.len(), 0);
    }
}
