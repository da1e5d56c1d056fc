//! Client facade over the connection engine.
//!
//! [`RelayLinkClient`] is a cheap-to-clone handle: validation and payload
//! encoding happen on the caller's task, then the operation is forwarded to
//! the connection task. Build one with [`RelayLinkClient::builder`].

use crate::connection::{Connection, ConnectionState, EngineStats, RequestHandle};
use crate::error::{RelayLinkError, Result};
use crate::events::EventHandlers;
use crate::frame::Message;
use crate::inbox::TokenGenerator;
use crate::options::{ConnectOptions, SubscribeOptions};
use crate::payload::{self, Payload, PayloadMode};
use crate::subscriptions::DeliveryHandler;
use crate::timeouts::RelayLinkTimeouts;
use crate::transport::Transport;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Asynchronous pub/sub client.
///
/// Clones share one connection; dropping the last clone closes it.
#[derive(Clone)]
pub struct RelayLinkClient {
    connection: Arc<Connection>,
    payload_mode: PayloadMode,
    max_payload: usize,
    timeouts: RelayLinkTimeouts,
}

impl RelayLinkClient {
    /// Start building a client.
    pub fn builder() -> RelayLinkClientBuilder {
        RelayLinkClientBuilder::new()
    }

    /// Publish a payload to a subject. Resolves once the frame is handed to
    /// the transport; use [`flush`](Self::flush) for a broker round trip.
    pub async fn publish(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<()> {
        let subject = subject.into();
        validate_subject(&subject)?;
        let bytes = self.prepare(payload)?;
        self.connection.publish(subject, None, bytes).await
    }

    /// Publish with an explicit reply subject, for manual request patterns.
    pub async fn publish_with_reply(
        &self,
        subject: impl Into<String>,
        reply_to: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<()> {
        let subject = subject.into();
        let reply_to = reply_to.into();
        validate_subject(&subject)?;
        validate_subject(&reply_to)?;
        let bytes = self.prepare(payload)?;
        self.connection.publish(subject, Some(reply_to), bytes).await
    }

    /// Subscribe to a subject. The handler runs on a dedicated worker task,
    /// one message at a time, in arrival order. Returns the subscription id
    /// used with [`unsubscribe`](Self::unsubscribe).
    pub async fn subscribe(
        &self,
        subject: impl Into<String>,
        handler: impl Fn(Message) + Send + Sync + 'static,
    ) -> Result<u64> {
        self.subscribe_with_options(subject, SubscribeOptions::new(), handler)
            .await
    }

    /// Subscribe with queue-group or auto-unsubscribe options.
    pub async fn subscribe_with_options(
        &self,
        subject: impl Into<String>,
        options: SubscribeOptions,
        handler: impl Fn(Message) + Send + Sync + 'static,
    ) -> Result<u64> {
        let subject = subject.into();
        validate_subject(&subject)?;
        let handler: DeliveryHandler = Arc::new(handler);
        self.connection
            .subscribe(subject, options.queue_group, options.max_deliveries, handler)
            .await
    }

    /// Remove a subscription. Unknown ids are ignored, so racing an
    /// auto-unsubscribe is harmless.
    pub async fn unsubscribe(&self, sid: u64) -> Result<()> {
        self.connection.unsubscribe(sid).await
    }

    /// Publish and await the reply, using the default request timeout.
    pub async fn request(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Payload>,
    ) -> Result<Message> {
        let timeout = self.timeouts.request_timeout;
        self.request_with_timeout(subject, payload, timeout).await
    }

    /// Publish and await the reply under an explicit deadline. On timeout the
    /// in-flight entry is cancelled, so a late reply is dropped instead of
    /// leaking.
    pub async fn request_with_timeout(
        &self,
        subject: impl Into<String>,
        payload: impl Into<Payload>,
        timeout: Duration,
    ) -> Result<Message> {
        let subject = subject.into();
        validate_subject(&subject)?;
        let bytes = self.prepare(payload)?;
        let RequestHandle { token, response_rx } =
            self.connection.request(subject, bytes).await?;
        match time::timeout(timeout, response_rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(RelayLinkError::ConnectionClosed),
            Err(_) => {
                self.connection.cancel_request(token);
                Err(RelayLinkError::Timeout(timeout))
            }
        }
    }

    /// Round trip to the broker: resolves once everything published before
    /// this call has been processed.
    pub async fn flush(&self) -> Result<()> {
        self.connection.flush().await
    }

    /// Gracefully shut down: unsubscribe everything, let deliveries already
    /// in flight reach their callbacks, then close. New work is rejected
    /// with [`RelayLinkError::ConnectionDraining`] while this runs. If the
    /// broker does not complete the round trip within the drain timeout, the
    /// connection is force-closed and `Timeout` is returned.
    pub async fn drain(&self) -> Result<()> {
        match time::timeout(self.timeouts.drain_timeout, self.connection.drain()).await {
            Ok(res) => res,
            Err(_) => {
                self.connection.close().await;
                Err(RelayLinkError::Timeout(self.timeouts.drain_timeout))
            }
        }
    }

    /// Close immediately, failing all pending requests and flushes.
    pub async fn close(&self) {
        self.connection.close().await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn is_draining(&self) -> bool {
        self.state() == ConnectionState::Draining
    }

    /// Point-in-time engine counters.
    pub async fn stats(&self) -> EngineStats {
        self.connection.stats().await
    }

    fn prepare(&self, payload: impl Into<Payload>) -> Result<Bytes> {
        let bytes = payload::encode(self.payload_mode, payload.into())?;
        if bytes.len() > self.max_payload {
            return Err(RelayLinkError::MaxPayloadExceeded {
                size: bytes.len(),
                limit: self.max_payload,
            });
        }
        Ok(bytes)
    }
}

fn validate_subject(subject: &str) -> Result<()> {
    if subject.is_empty() {
        return Err(RelayLinkError::BadSubject(
            "subject cannot be empty".to_string(),
        ));
    }
    if subject
        .chars()
        .any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(RelayLinkError::BadSubject(format!(
            "subject contains whitespace or control characters: {:?}",
            subject
        )));
    }
    Ok(())
}

/// Builder for [`RelayLinkClient`].
#[derive(Debug, Clone, Default)]
pub struct RelayLinkClientBuilder {
    options: ConnectOptions,
    timeouts: RelayLinkTimeouts,
    events: EventHandlers,
    token_seed: Option<u64>,
}

impl RelayLinkClientBuilder {
    pub fn new() -> Self {
        Self {
            options: ConnectOptions::default(),
            timeouts: RelayLinkTimeouts::default(),
            events: EventHandlers::new(),
            token_seed: None,
        }
    }

    /// Display name reported to the broker.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.options.name = Some(name.into());
        self
    }

    /// Ask the broker to acknowledge every command with `+OK`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.options.verbose = verbose;
        self
    }

    /// Ask the broker for stricter protocol checking.
    pub fn pedantic(mut self, pedantic: bool) -> Self {
        self.options.pedantic = pedantic;
        self
    }

    /// Suppress delivery of this client's own publishes back to itself.
    pub fn no_echo(mut self, no_echo: bool) -> Self {
        self.options.no_echo = no_echo;
        self
    }

    /// Maximum outbound payload size in bytes.
    pub fn max_payload(mut self, max_payload: usize) -> Self {
        self.options.max_payload = max_payload;
        self
    }

    /// Authenticate with username and password.
    pub fn user_pass(mut self, user: impl Into<String>, pass: impl Into<String>) -> Self {
        self.options.user = Some(user.into());
        self.options.pass = Some(pass.into());
        self
    }

    /// Authenticate with a bare token.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.options.token = Some(token.into());
        self
    }

    /// Authenticate with a signed JWT.
    pub fn jwt(mut self, jwt: impl Into<String>) -> Self {
        self.options.jwt = Some(jwt.into());
        self
    }

    /// Payload-encoding discipline for `publish`/`request` values.
    pub fn payload_mode(mut self, mode: PayloadMode) -> Self {
        self.options.payload_mode = mode;
        self
    }

    /// Timeout configuration.
    pub fn timeouts(mut self, timeouts: RelayLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Lifecycle event listeners.
    pub fn events(mut self, events: EventHandlers) -> Self {
        self.events = events;
        self
    }

    /// Seed the reply-token generator; makes inbox subjects deterministic
    /// for tests.
    pub fn token_seed(mut self, seed: u64) -> Self {
        self.token_seed = Some(seed);
        self
    }

    /// Perform the handshake over the given transport and return a connected
    /// client. Invalid auth configuration fails here, before any I/O.
    pub async fn connect(self, transport: Box<dyn Transport>) -> Result<RelayLinkClient> {
        let connect_info = self.options.connect_info()?;
        let tokens = match self.token_seed {
            Some(seed) => TokenGenerator::with_seed(seed),
            None => TokenGenerator::new(),
        };
        let connection = Connection::connect(
            transport,
            connect_info,
            self.events,
            tokens,
            self.timeouts.connect_timeout,
        )
        .await?;
        Ok(RelayLinkClient {
            connection: Arc::new(connection),
            payload_mode: self.options.payload_mode,
            max_payload: self.options.max_payload,
            timeouts: self.timeouts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_validation() {
        assert!(validate_subject("orders.created").is_ok());
        assert!(validate_subject("_INBOX.abc.def").is_ok());
        assert!(matches!(
            validate_subject(""),
            Err(RelayLinkError::BadSubject(_))
        ));
        assert!(matches!(
            validate_subject("orders created"),
            Err(RelayLinkError::BadSubject(_))
        ));
        assert!(matches!(
            validate_subject("orders\ncreated"),
            Err(RelayLinkError::BadSubject(_))
        ));
    }

    #[test]
    fn test_builder_collects_options() {
        let builder = RelayLinkClient::builder()
            .name("svc")
            .verbose(true)
            .no_echo(true)
            .max_payload(512)
            .token("t0k3n")
            .payload_mode(PayloadMode::Json)
            .token_seed(7);
        assert_eq!(builder.options.name.as_deref(), Some("svc"));
        assert!(builder.options.verbose);
        assert!(builder.options.no_echo);
        assert_eq!(builder.options.max_payload, 512);
        assert_eq!(builder.options.payload_mode, PayloadMode::Json);
        assert_eq!(builder.token_seed, Some(7));
    }
}
