//! Client-side pub/sub protocol engine.
//!
//! `relay-link` implements the client half of a subject-based messaging
//! protocol: a handshake-driven connection lifecycle, subscription dispatch
//! with per-subscription callback queues, multiplexed request/reply over a
//! shared inbox, FIFO flush coordination, and graceful drain.
//!
//! The engine is transport-agnostic: anything implementing
//! [`Transport`](transport::Transport) carries the typed frames. The crate
//! ships an in-memory transport for tests and embedded brokers.
//!
//! # Example
//!
//! ```no_run
//! use relay_link::transport::memory_pair;
//! use relay_link::RelayLinkClient;
//!
//! # async fn run() -> relay_link::Result<()> {
//! let (transport, _broker) = memory_pair();
//! let client = RelayLinkClient::builder()
//!     .name("worker-1")
//!     .connect(Box::new(transport))
//!     .await?;
//!
//! client
//!     .subscribe("orders.created", |msg| {
//!         println!("received: {}", msg.payload_lossy());
//!     })
//!     .await?;
//!
//! client.publish("orders.created", "order 42").await?;
//! client.flush().await?;
//! client.drain().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod connection;
mod drain;
mod error;
mod events;
mod flush;
mod frame;
mod inbox;
mod mux;
mod options;
mod payload;
mod subscriptions;
mod timeouts;
pub mod transport;

pub use client::{RelayLinkClient, RelayLinkClientBuilder};
pub use connection::{ConnectionState, EngineStats};
pub use error::{RelayLinkError, Result};
pub use events::{DisconnectReason, EventHandlers};
pub use frame::{ClientFrame, ConnectInfo, Message, ServerFrame, ServerInfo};
pub use inbox::{TokenGenerator, INBOX_PREFIX};
pub use options::{AuthCredential, ConnectOptions, SubscribeOptions, DEFAULT_MAX_PAYLOAD};
pub use payload::{Payload, PayloadMode};
pub use timeouts::{RelayLinkTimeouts, RelayLinkTimeoutsBuilder};
