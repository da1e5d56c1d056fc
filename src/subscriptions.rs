//! Subject registry: active subscriptions keyed by subscription identifier.
//!
//! The registry is owned by the connection task, so all mutations happen on
//! the dispatch path and need no locking. Delivery is decoupled from frame
//! processing: each subscription gets its own unbounded queue drained by a
//! worker task that invokes the user callback, so a slow or panicking
//! callback never stalls dispatch to other subscriptions.

use crate::frame::Message;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Callback invoked once per delivered message.
pub(crate) type DeliveryHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// Outcome of routing one delivery frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// Queued for the subscription's worker.
    Delivered,
    /// Queued, and the delivery count reached the configured maximum; the
    /// caller must emit an unsubscribe and remove the entry.
    ReachedMax,
    /// No subscription with that sid; frame dropped (removal race).
    Dropped,
}

/// State for one active subscription.
struct SubEntry {
    subject: String,
    queue_group: Option<String>,
    max_deliveries: Option<u64>,
    delivered: u64,
    delivery_tx: mpsc::UnboundedSender<Message>,
    worker: JoinHandle<()>,
}

/// Active subscriptions keyed by sid.
pub(crate) struct SubscriptionRegistry {
    subs: HashMap<u64, SubEntry>,
    next_sid: u64,
}

impl SubscriptionRegistry {
    pub(crate) fn new() -> Self {
        Self {
            subs: HashMap::new(),
            next_sid: 1,
        }
    }

    /// Allocate the next subscription identifier. Identifiers are monotonic
    /// and never reused for the lifetime of the connection.
    pub(crate) fn allocate_sid(&mut self) -> u64 {
        let sid = self.next_sid;
        self.next_sid += 1;
        sid
    }

    /// Register a subscription and spawn its delivery worker.
    pub(crate) fn insert(
        &mut self,
        subject: String,
        queue_group: Option<String>,
        max_deliveries: Option<u64>,
        handler: DeliveryHandler,
    ) -> u64 {
        let sid = self.allocate_sid();
        let (delivery_tx, mut delivery_rx) = mpsc::unbounded_channel::<Message>();
        let worker_subject = subject.clone();
        let worker = tokio::spawn(async move {
            while let Some(msg) = delivery_rx.recv().await {
                if catch_unwind(AssertUnwindSafe(|| handler(msg))).is_err() {
                    log::warn!(
                        "subscription callback panicked (subject {})",
                        worker_subject
                    );
                }
            }
        });
        log::debug!("subscribed sid={} subject={}", sid, subject);
        self.subs.insert(
            sid,
            SubEntry {
                subject,
                queue_group,
                max_deliveries,
                delivered: 0,
                delivery_tx,
                worker,
            },
        );
        sid
    }

    /// Remove a subscription. Returns `false` if the sid is unknown
    /// (already removed). Messages already queued for the worker are still
    /// delivered before it exits.
    pub(crate) fn remove(&mut self, sid: u64) -> bool {
        match self.subs.remove(&sid) {
            Some(entry) => {
                log::debug!(
                    "removed subscription sid={} subject={} queue={:?}",
                    sid,
                    entry.subject,
                    entry.queue_group
                );
                true
            }
            None => false,
        }
    }

    /// Route a delivery frame to its subscription queue.
    pub(crate) fn dispatch(&mut self, msg: Message) -> DispatchOutcome {
        let Some(entry) = self.subs.get_mut(&msg.sid) else {
            return DispatchOutcome::Dropped;
        };
        // The worker only stops when the sender is dropped, so this cannot
        // fail while the entry exists.
        let _ = entry.delivery_tx.send(msg);
        entry.delivered += 1;
        match entry.max_deliveries {
            Some(max) if entry.delivered >= max => DispatchOutcome::ReachedMax,
            _ => DispatchOutcome::Delivered,
        }
    }

    /// Sids of all active subscriptions, in allocation order.
    pub(crate) fn sids(&self) -> Vec<u64> {
        let mut sids: Vec<u64> = self.subs.keys().copied().collect();
        sids.sort_unstable();
        sids
    }

    pub(crate) fn len(&self) -> usize {
        self.subs.len()
    }

    /// Tear down every subscription, returning the worker handles so the
    /// caller can await in-flight deliveries. Dropping the senders lets each
    /// worker finish its queued messages and exit.
    pub(crate) fn finish_all(&mut self) -> Vec<JoinHandle<()>> {
        self.subs.drain().map(|(_, entry)| entry.worker).collect()
    }
}
