//! Drain state machine.
//!
//! Drain is a graceful shutdown: stop taking new work, let deliveries that
//! are already on the wire reach their callbacks, then close. The coordinator
//! only tracks where the sequence stands; the connection task drives the
//! actual unsubscribe/barrier/teardown steps.

use crate::error::{RelayLinkError, Result};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainState {
    Idle,
    /// Unsubscribes sent, waiting for the barrier PING to round-trip.
    Draining,
    Drained,
}

pub(crate) struct DrainCoordinator {
    state: DrainState,
    waiter: Option<oneshot::Sender<Result<()>>>,
}

impl DrainCoordinator {
    pub(crate) fn new() -> Self {
        Self {
            state: DrainState::Idle,
            waiter: None,
        }
    }

    /// Start a drain. Returns `false` if one is already underway or done,
    /// in which case the caller's waiter is rejected.
    pub(crate) fn begin(&mut self, waiter: oneshot::Sender<Result<()>>) -> bool {
        if self.state != DrainState::Idle {
            let _ = waiter.send(Err(RelayLinkError::ConnectionDraining));
            return false;
        }
        self.state = DrainState::Draining;
        self.waiter = Some(waiter);
        true
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.state == DrainState::Draining
    }

    /// The barrier PONG arrived; hand the waiter back so the connection task
    /// can resolve it once teardown completes.
    pub(crate) fn barrier_reached(&mut self) -> Option<oneshot::Sender<Result<()>>> {
        if self.state != DrainState::Draining {
            return None;
        }
        self.state = DrainState::Drained;
        self.waiter.take()
    }

    /// Abort an in-progress drain (connection lost before the barrier).
    pub(crate) fn fail(&mut self, err: RelayLinkError) {
        if let Some(waiter) = self.waiter.take() {
            let _ = waiter.send(Err(err));
        }
        if self.state == DrainState::Draining {
            self.state = DrainState::Drained;
        }
    }
}
