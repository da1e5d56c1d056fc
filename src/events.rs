//! Connection lifecycle event handlers.
//!
//! Callback-based hooks for monitoring connection events:
//!
//! - [`on_connect`](EventHandlers::on_connect): fired when the handshake completes
//! - [`on_disconnect`](EventHandlers::on_disconnect): fired when the connection closes
//! - [`on_error`](EventHandlers::on_error): fired on broker-reported or protocol errors
//!
//! Each hook is an ordered list: listeners run in registration order and each
//! invocation is isolated, so one panicking listener never blocks the others
//! or the dispatch loop.

use crate::error::RelayLinkError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Reason for a disconnect event.
#[derive(Debug, Clone)]
pub struct DisconnectReason {
    /// Human-readable description of why the connection closed.
    pub message: String,
}

impl DisconnectReason {
    /// Create a new disconnect reason with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Type alias for the on_connect callback.
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Type alias for the on_disconnect callback.
pub type DisconnectCallback = Arc<dyn Fn(&DisconnectReason) + Send + Sync>;

/// Type alias for the on_error callback.
pub type ErrorCallback = Arc<dyn Fn(&RelayLinkError) + Send + Sync>;

/// Ordered lists of connection lifecycle listeners.
///
/// All handlers are optional; the builder pattern registers only the ones you
/// need. Handlers are `Send + Sync` so they work with the async runtime.
#[derive(Clone, Default)]
pub struct EventHandlers {
    on_connect: Vec<ConnectCallback>,
    on_disconnect: Vec<DisconnectCallback>,
    on_error: Vec<ErrorCallback>,
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("on_connect", &self.on_connect.len())
            .field("on_disconnect", &self.on_disconnect.len())
            .field("on_error", &self.on_error.len())
            .finish()
    }
}

impl EventHandlers {
    /// Create a new empty `EventHandlers` (no callbacks registered).
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback invoked when the connection is established.
    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect.push(Arc::new(f));
        self
    }

    /// Register a callback invoked when the connection is closed.
    pub fn on_disconnect(
        mut self,
        f: impl Fn(&DisconnectReason) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect.push(Arc::new(f));
        self
    }

    /// Register a callback invoked when the broker reports an error.
    pub fn on_error(mut self, f: impl Fn(&RelayLinkError) + Send + Sync + 'static) -> Self {
        self.on_error.push(Arc::new(f));
        self
    }

    /// Returns `true` if any listener is registered.
    pub fn has_any(&self) -> bool {
        !self.on_connect.is_empty() || !self.on_disconnect.is_empty() || !self.on_error.is_empty()
    }

    // ---------------------------------------------------------------
    // Internal dispatch helpers
    // ---------------------------------------------------------------

    /// Dispatch the on_connect event.
    pub(crate) fn emit_connect(&self) {
        for cb in &self.on_connect {
            invoke_isolated("on_connect", || cb());
        }
    }

    /// Dispatch the on_disconnect event.
    pub(crate) fn emit_disconnect(&self, reason: &DisconnectReason) {
        for cb in &self.on_disconnect {
            invoke_isolated("on_disconnect", || cb(reason));
        }
    }

    /// Dispatch the on_error event.
    pub(crate) fn emit_error(&self, error: &RelayLinkError) {
        for cb in &self.on_error {
            invoke_isolated("on_error", || cb(error));
        }
    }
}

/// Run a listener, swallowing any panic so later listeners still fire.
fn invoke_isolated(hook: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        log::warn!("{} listener panicked; continuing", hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_listeners_fire_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let a = order.clone();
        let b = order.clone();
        let handlers = EventHandlers::new()
            .on_connect(move || a.lock().unwrap().push("first"))
            .on_connect(move || b.lock().unwrap().push("second"));

        handlers.emit_connect();
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_panicking_listener_does_not_block_others() {
        let fired = Arc::new(Mutex::new(false));
        let flag = fired.clone();
        let handlers = EventHandlers::new()
            .on_disconnect(|_| panic!("listener bug"))
            .on_disconnect(move |_| *flag.lock().unwrap() = true);

        handlers.emit_disconnect(&DisconnectReason::new("test"));
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn test_error_listener_receives_error() {
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        let handlers = EventHandlers::new()
            .on_error(move |e| *slot.lock().unwrap() = Some(e.to_string()));

        handlers.emit_error(&RelayLinkError::ServerError("bad subject".to_string()));
        assert!(seen.lock().unwrap().as_deref().unwrap().contains("bad subject"));
    }

    #[test]
    fn test_has_any() {
        assert!(!EventHandlers::new().has_any());
        assert!(EventHandlers::new().on_connect(|| {}).has_any());
    }
}
