//! Transport seam between the connection engine and a broker.
//!
//! The engine speaks typed frames; how they travel is the transport's
//! business. The in-memory implementation here backs the test suite and any
//! embedded broker; a network transport implements the same trait over a
//! socket.

use crate::error::{RelayLinkError, Result};
use crate::frame::{ClientFrame, ServerFrame};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// A bidirectional, ordered frame channel to one broker.
///
/// Implementations must preserve ordering in both directions: the engine
/// relies on PONGs acknowledging PINGs in submission order, and on delivery
/// frames arriving before the PONG that follows them.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame to the broker.
    async fn send(&mut self, frame: ClientFrame) -> Result<()>;

    /// Receive the next frame. `None` means the broker closed the channel.
    async fn recv(&mut self) -> Option<ServerFrame>;

    /// Tear down the channel. Subsequent `recv` calls return `None`.
    async fn close(&mut self);
}

/// In-memory transport over unbounded channels, paired with a [`BrokerEnd`].
pub struct MemoryTransport {
    frames_tx: mpsc::UnboundedSender<ClientFrame>,
    frames_rx: mpsc::UnboundedReceiver<ServerFrame>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: ClientFrame) -> Result<()> {
        self.frames_tx
            .send(frame)
            .map_err(|_| RelayLinkError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<ServerFrame> {
        self.frames_rx.recv().await
    }

    async fn close(&mut self) {
        self.frames_rx.close();
    }
}

/// The broker side of a [`MemoryTransport`] pair. Tests and embedded brokers
/// use it to script broker behavior frame by frame.
pub struct BrokerEnd {
    frames_tx: mpsc::UnboundedSender<ServerFrame>,
    frames_rx: mpsc::UnboundedReceiver<ClientFrame>,
}

impl BrokerEnd {
    /// Push a frame toward the client. Returns `false` once the client side
    /// is gone.
    pub fn deliver(&self, frame: ServerFrame) -> bool {
        self.frames_tx.send(frame).is_ok()
    }

    /// Await the next frame from the client. `None` means the client side
    /// was dropped.
    pub async fn next_frame(&mut self) -> Option<ClientFrame> {
        self.frames_rx.recv().await
    }
}

/// Create a connected in-memory transport pair.
pub fn memory_pair() -> (MemoryTransport, BrokerEnd) {
    let (client_tx, client_rx) = mpsc::unbounded_channel();
    let (server_tx, server_rx) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            frames_tx: client_tx,
            frames_rx: server_rx,
        },
        BrokerEnd {
            frames_tx: server_tx,
            frames_rx: client_rx,
        },
    )
}
