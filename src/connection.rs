//! Connection engine: handshake, dispatch loop, and lifecycle.
//!
//! The engine is a background task that owns the transport plus all mutable
//! protocol state (subject registry, request correlator, flush queue, drain
//! coordinator). Callers talk to it through a command channel; every state
//! mutation happens on the task, so there is a single serialization point
//! and no lock ordering to reason about. The task mirrors its lifecycle
//! state into an atomic so facade methods can answer `is_closed` without a
//! round trip.

use crate::drain::DrainCoordinator;
use crate::error::{RelayLinkError, Result};
use crate::events::{DisconnectReason, EventHandlers};
use crate::flush::{FlushQueue, FlushWaiter};
use crate::frame::{ClientFrame, ConnectInfo, Message, ServerFrame, ServerInfo};
use crate::inbox::TokenGenerator;
use crate::mux::MuxCorrelator;
use crate::subscriptions::{DeliveryHandler, DispatchOutcome, SubscriptionRegistry};
use crate::transport::Transport;
use bytes::Bytes;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// Handshake in progress.
    Connecting = 0,
    /// Handshake complete; all operations accepted.
    Connected = 1,
    /// Drain in progress; new work is rejected.
    Draining = 2,
    /// Closed; every operation fails with `ConnectionClosed`.
    Closed = 3,
}

impl ConnectionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Connected,
            2 => ConnectionState::Draining,
            _ => ConnectionState::Closed,
        }
    }
}

/// Point-in-time counters reported by [`stats`](crate::RelayLinkClient::stats).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStats {
    /// Current lifecycle state.
    pub state: ConnectionState,
    /// Active subscriptions (the internal inbox subscription excluded).
    pub subscriptions: usize,
    /// Requests awaiting a reply.
    pub pending_requests: usize,
    /// Unacknowledged PINGs, drain barrier included.
    pub pending_flushes: usize,
}

/// Commands accepted by the connection task.
enum ConnCmd {
    Publish {
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Subscribe {
        subject: String,
        queue_group: Option<String>,
        max_deliveries: Option<u64>,
        handler: DeliveryHandler,
        result_tx: oneshot::Sender<Result<u64>>,
    },
    Unsubscribe {
        sid: u64,
        result_tx: oneshot::Sender<Result<()>>,
    },
    Request {
        subject: String,
        payload: Bytes,
        result_tx: oneshot::Sender<Result<RequestHandle>>,
    },
    CancelRequest {
        token: String,
    },
    Flush {
        result_tx: oneshot::Sender<Result<()>>,
    },
    Drain {
        result_tx: oneshot::Sender<Result<()>>,
    },
    Close {
        ack_tx: oneshot::Sender<()>,
    },
    Stats {
        result_tx: oneshot::Sender<EngineStats>,
    },
}

/// An in-flight request: the reply receiver plus the token needed to cancel
/// it on timeout.
pub(crate) struct RequestHandle {
    pub(crate) token: String,
    pub(crate) response_rx: oneshot::Receiver<Message>,
}

/// Handle to a running connection task.
pub(crate) struct Connection {
    cmd_tx: mpsc::Sender<ConnCmd>,
    state: Arc<AtomicU8>,
    _task: JoinHandle<()>,
}

const CMD_CHANNEL_CAPACITY: usize = 256;

impl Connection {
    /// Spawn the connection task and run the handshake to completion.
    pub(crate) async fn connect(
        transport: Box<dyn Transport>,
        connect_info: ConnectInfo,
        events: EventHandlers,
        tokens: TokenGenerator,
        connect_timeout: Duration,
    ) -> Result<Connection> {
        let (cmd_tx, cmd_rx) = mpsc::channel(CMD_CHANNEL_CAPACITY);
        let state = Arc::new(AtomicU8::new(ConnectionState::Connecting as u8));
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = tokio::spawn(connection_task(
            transport,
            connect_info,
            events,
            tokens,
            cmd_rx,
            state.clone(),
            ready_tx,
        ));

        match time::timeout(connect_timeout, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(Connection {
                cmd_tx,
                state,
                _task: task,
            }),
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(RelayLinkError::ConnectionFailed(
                "connection task exited during handshake".to_string(),
            )),
            Err(_) => {
                task.abort();
                state.store(ConnectionState::Closed as u8, Ordering::SeqCst);
                Err(RelayLinkError::ConnectionFailed(
                    "handshake timed out".to_string(),
                ))
            }
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) async fn publish(
        &self,
        subject: String,
        reply_to: Option<String>,
        payload: Bytes,
    ) -> Result<()> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Publish {
            subject,
            reply_to,
            payload,
            result_tx,
        })
        .await?;
        await_reply(rx).await
    }

    pub(crate) async fn subscribe(
        &self,
        subject: String,
        queue_group: Option<String>,
        max_deliveries: Option<u64>,
        handler: DeliveryHandler,
    ) -> Result<u64> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Subscribe {
            subject,
            queue_group,
            max_deliveries,
            handler,
            result_tx,
        })
        .await?;
        await_reply(rx).await
    }

    pub(crate) async fn unsubscribe(&self, sid: u64) -> Result<()> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Unsubscribe { sid, result_tx }).await?;
        await_reply(rx).await
    }

    pub(crate) async fn request(&self, subject: String, payload: Bytes) -> Result<RequestHandle> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Request {
            subject,
            payload,
            result_tx,
        })
        .await?;
        await_reply(rx).await
    }

    /// Forget an in-flight request after its waiter timed out. Best effort:
    /// if the task is gone the table is gone with it.
    pub(crate) fn cancel_request(&self, token: String) {
        let _ = self.cmd_tx.try_send(ConnCmd::CancelRequest { token });
    }

    pub(crate) async fn flush(&self) -> Result<()> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Flush { result_tx }).await?;
        await_reply(rx).await
    }

    pub(crate) async fn drain(&self) -> Result<()> {
        let (result_tx, rx) = oneshot::channel();
        self.send_cmd(ConnCmd::Drain { result_tx }).await?;
        await_reply(rx).await
    }

    /// Close immediately. Idempotent; awaits the task's acknowledgment so
    /// teardown is complete when this returns.
    pub(crate) async fn close(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.send_cmd(ConnCmd::Close { ack_tx }).await.is_ok() {
            let _ = ack_rx.await;
        }
    }

    pub(crate) async fn stats(&self) -> EngineStats {
        let (result_tx, rx) = oneshot::channel();
        if self.send_cmd(ConnCmd::Stats { result_tx }).await.is_ok() {
            if let Ok(stats) = rx.await {
                return stats;
            }
        }
        EngineStats {
            state: self.state(),
            subscriptions: 0,
            pending_requests: 0,
            pending_flushes: 0,
        }
    }

    async fn send_cmd(&self, cmd: ConnCmd) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| RelayLinkError::ConnectionClosed)
    }
}

/// Await a response channel, mapping a dropped sender (task exited mid
/// operation) to `ConnectionClosed`.
async fn await_reply<T>(rx: oneshot::Receiver<Result<T>>) -> Result<T> {
    rx.await.map_err(|_| RelayLinkError::ConnectionClosed)?
}

/// All state owned by the connection task.
struct EngineCore {
    transport: Box<dyn Transport>,
    events: EventHandlers,
    registry: SubscriptionRegistry,
    mux: MuxCorrelator,
    flush: FlushQueue,
    drain: DrainCoordinator,
    state: Arc<AtomicU8>,
}

async fn connection_task(
    mut transport: Box<dyn Transport>,
    connect_info: ConnectInfo,
    events: EventHandlers,
    tokens: TokenGenerator,
    mut cmd_rx: mpsc::Receiver<ConnCmd>,
    state: Arc<AtomicU8>,
    ready_tx: oneshot::Sender<Result<()>>,
) {
    let server_info = match perform_handshake(transport.as_mut(), connect_info).await {
        Ok(info) => info,
        Err(e) => {
            state.store(ConnectionState::Closed as u8, Ordering::SeqCst);
            transport.close().await;
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    state.store(ConnectionState::Connected as u8, Ordering::SeqCst);
    events.emit_connect();
    let _ = ready_tx.send(Ok(()));
    log::info!(
        "connected to {} (version {})",
        server_info.server_id,
        server_info.version
    );

    let mut core = EngineCore {
        transport,
        events,
        registry: SubscriptionRegistry::new(),
        mux: MuxCorrelator::new(tokens),
        flush: FlushQueue::new(),
        drain: DrainCoordinator::new(),
        state,
    };

    loop {
        tokio::select! {
            frame = core.transport.recv() => {
                match frame {
                    Some(frame) => {
                        if core.handle_frame(frame).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        core.close_connection("transport closed").await;
                        break;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(cmd) => {
                        if core.handle_command(cmd).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        core.close_connection("connection handle dropped").await;
                        break;
                    }
                }
            }
        }
    }
}

/// INFO -> CONNECT -> PING -> PONG. The trailing round trip surfaces auth
/// rejections before the connection is reported ready.
async fn perform_handshake(
    transport: &mut dyn Transport,
    connect_info: ConnectInfo,
) -> Result<ServerInfo> {
    let info = loop {
        match transport.recv().await {
            Some(ServerFrame::Info(info)) => break info,
            Some(ServerFrame::Ping) => send_handshake(transport, ClientFrame::Pong).await?,
            Some(ServerFrame::Err(msg)) => return Err(RelayLinkError::ConnectionFailed(msg)),
            Some(other) => {
                return Err(RelayLinkError::ConnectionFailed(format!(
                    "expected INFO, got {:?}",
                    other
                )))
            }
            None => {
                return Err(RelayLinkError::ConnectionFailed(
                    "transport closed during handshake".to_string(),
                ))
            }
        }
    };

    send_handshake(transport, ClientFrame::Connect(connect_info)).await?;
    send_handshake(transport, ClientFrame::Ping).await?;

    loop {
        match transport.recv().await {
            Some(ServerFrame::Pong) => return Ok(info),
            Some(ServerFrame::Ping) => send_handshake(transport, ClientFrame::Pong).await?,
            Some(ServerFrame::Ok) => continue,
            Some(ServerFrame::Err(msg)) => return Err(RelayLinkError::ConnectionFailed(msg)),
            Some(other) => {
                return Err(RelayLinkError::ConnectionFailed(format!(
                    "expected PONG, got {:?}",
                    other
                )))
            }
            None => {
                return Err(RelayLinkError::ConnectionFailed(
                    "transport closed during handshake".to_string(),
                ))
            }
        }
    }
}

async fn send_handshake(transport: &mut dyn Transport, frame: ClientFrame) -> Result<()> {
    transport
        .send(frame)
        .await
        .map_err(|e| RelayLinkError::ConnectionFailed(e.to_string()))
}

impl EngineCore {
    async fn handle_frame(&mut self, frame: ServerFrame) -> ControlFlow<()> {
        match frame {
            ServerFrame::Msg {
                sid,
                subject,
                reply_to,
                payload,
            } => {
                let msg = Message {
                    sid,
                    subject,
                    reply_to,
                    payload,
                };
                if self.mux.mux_sid() == Some(sid) {
                    if !self.mux.resolve(msg) {
                        log::debug!("dropped reply with no pending request");
                    }
                } else {
                    match self.registry.dispatch(msg) {
                        DispatchOutcome::Delivered => {}
                        DispatchOutcome::ReachedMax => {
                            self.registry.remove(sid);
                            let _ = self.transport.send(ClientFrame::Unsub { sid }).await;
                        }
                        DispatchOutcome::Dropped => {
                            log::debug!("dropped message for removed sid={}", sid);
                        }
                    }
                }
                ControlFlow::Continue(())
            }
            ServerFrame::Ping => {
                if self.transport.send(ClientFrame::Pong).await.is_err() {
                    self.close_connection("transport closed").await;
                    return ControlFlow::Break(());
                }
                ControlFlow::Continue(())
            }
            ServerFrame::Pong => self.handle_pong().await,
            ServerFrame::Ok => ControlFlow::Continue(()),
            ServerFrame::Err(msg) => {
                log::warn!("broker error: {}", msg);
                self.events.emit_error(&RelayLinkError::ServerError(msg));
                ControlFlow::Continue(())
            }
            ServerFrame::Info(info) => {
                // Brokers may push updated INFO mid-connection.
                log::debug!("broker info update from {}", info.server_id);
                ControlFlow::Continue(())
            }
        }
    }

    async fn handle_pong(&mut self) -> ControlFlow<()> {
        match self.flush.acknowledge() {
            Some(FlushWaiter::User(tx)) => {
                let _ = tx.send(Ok(()));
                ControlFlow::Continue(())
            }
            Some(FlushWaiter::DrainBarrier) => {
                // Every delivery sent before the barrier PONG is already in
                // its subscription queue; finish the workers so callbacks
                // run before we report the drain complete.
                let waiter = self.drain.barrier_reached();
                self.mux.reject_all();
                for worker in self.registry.finish_all() {
                    let _ = worker.await;
                }
                self.transport.close().await;
                self.flush.fail_all();
                self.state
                    .store(ConnectionState::Closed as u8, Ordering::SeqCst);
                self.events
                    .emit_disconnect(&DisconnectReason::new("drained"));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(Ok(()));
                }
                ControlFlow::Break(())
            }
            // Unsolicited PONG; nothing was waiting.
            None => ControlFlow::Continue(()),
        }
    }

    async fn handle_command(&mut self, cmd: ConnCmd) -> ControlFlow<()> {
        match cmd {
            ConnCmd::Publish {
                subject,
                reply_to,
                payload,
                result_tx,
            } => {
                if self.drain.is_draining() {
                    let _ = result_tx.send(Err(RelayLinkError::ConnectionDraining));
                } else {
                    let res = self
                        .transport
                        .send(ClientFrame::Pub {
                            subject,
                            reply_to,
                            payload,
                        })
                        .await;
                    let _ = result_tx.send(res);
                }
                ControlFlow::Continue(())
            }
            ConnCmd::Subscribe {
                subject,
                queue_group,
                max_deliveries,
                handler,
                result_tx,
            } => {
                if self.drain.is_draining() {
                    let _ = result_tx.send(Err(RelayLinkError::ConnectionDraining));
                    return ControlFlow::Continue(());
                }
                let sid =
                    self.registry
                        .insert(subject.clone(), queue_group.clone(), max_deliveries, handler);
                let res = self
                    .transport
                    .send(ClientFrame::Sub {
                        sid,
                        subject,
                        queue_group,
                    })
                    .await;
                match res {
                    Ok(()) => {
                        let _ = result_tx.send(Ok(sid));
                    }
                    Err(e) => {
                        self.registry.remove(sid);
                        let _ = result_tx.send(Err(e));
                    }
                }
                ControlFlow::Continue(())
            }
            ConnCmd::Unsubscribe { sid, result_tx } => {
                if self.drain.is_draining() {
                    let _ = result_tx.send(Err(RelayLinkError::ConnectionDraining));
                    return ControlFlow::Continue(());
                }
                // Unknown sid means it was already removed; unsubscribe is
                // idempotent.
                let res = if self.registry.remove(sid) {
                    self.transport.send(ClientFrame::Unsub { sid }).await
                } else {
                    Ok(())
                };
                let _ = result_tx.send(res);
                ControlFlow::Continue(())
            }
            ConnCmd::Request {
                subject,
                payload,
                result_tx,
            } => {
                if self.drain.is_draining() {
                    let _ = result_tx.send(Err(RelayLinkError::ConnectionDraining));
                    return ControlFlow::Continue(());
                }
                let _ = result_tx.send(self.start_request(subject, payload).await);
                ControlFlow::Continue(())
            }
            ConnCmd::CancelRequest { token } => {
                self.mux.cancel(&token);
                ControlFlow::Continue(())
            }
            ConnCmd::Flush { result_tx } => {
                if self.drain.is_draining() {
                    let _ = result_tx.send(Err(RelayLinkError::ConnectionDraining));
                    return ControlFlow::Continue(());
                }
                match self.transport.send(ClientFrame::Ping).await {
                    Ok(()) => self.flush.push_user(result_tx),
                    Err(e) => {
                        let _ = result_tx.send(Err(e));
                    }
                }
                ControlFlow::Continue(())
            }
            ConnCmd::Drain { result_tx } => {
                if self.drain.begin(result_tx) {
                    self.start_drain().await;
                }
                ControlFlow::Continue(())
            }
            ConnCmd::Close { ack_tx } => {
                self.close_connection("closed by client").await;
                let _ = ack_tx.send(());
                ControlFlow::Break(())
            }
            ConnCmd::Stats { result_tx } => {
                let _ = result_tx.send(EngineStats {
                    state: ConnectionState::from_u8(self.state.load(Ordering::SeqCst)),
                    subscriptions: self.registry.len(),
                    pending_requests: self.mux.pending_len(),
                    pending_flushes: self.flush.len(),
                });
                ControlFlow::Continue(())
            }
        }
    }

    /// Lazily subscribe the wildcard inbox, then publish with a fresh reply
    /// subject registered in the correlator.
    async fn start_request(&mut self, subject: String, payload: Bytes) -> Result<RequestHandle> {
        if self.mux.mux_sid().is_none() {
            let sid = self.registry.allocate_sid();
            self.transport
                .send(ClientFrame::Sub {
                    sid,
                    subject: self.mux.wildcard(),
                    queue_group: None,
                })
                .await?;
            self.mux.mark_subscribed(sid);
        }
        let (token, reply_subject, response_rx) = self.mux.register();
        let res = self
            .transport
            .send(ClientFrame::Pub {
                subject,
                reply_to: Some(reply_subject),
                payload,
            })
            .await;
        match res {
            Ok(()) => Ok(RequestHandle { token, response_rx }),
            Err(e) => {
                self.mux.cancel(&token);
                Err(e)
            }
        }
    }

    /// Unsubscribe everything (keeping registry entries so in-flight
    /// deliveries still route), then mark the flush queue with a barrier
    /// PING. Teardown happens when the barrier PONG comes back.
    async fn start_drain(&mut self) {
        self.state
            .store(ConnectionState::Draining as u8, Ordering::SeqCst);
        log::info!("draining connection");
        for sid in self.registry.sids() {
            if self.transport.send(ClientFrame::Unsub { sid }).await.is_err() {
                return; // recv() will observe the closed transport
            }
        }
        if let Some(sid) = self.mux.mux_sid() {
            if self.transport.send(ClientFrame::Unsub { sid }).await.is_err() {
                return;
            }
        }
        if self.transport.send(ClientFrame::Ping).await.is_ok() {
            self.flush.push_barrier();
        }
    }

    /// Immediate teardown: fail all pending work and notify listeners.
    /// Safe to call more than once.
    async fn close_connection(&mut self, reason: &str) {
        let previous = self
            .state
            .swap(ConnectionState::Closed as u8, Ordering::SeqCst);
        if previous == ConnectionState::Closed as u8 {
            return;
        }
        log::info!("connection closed: {}", reason);
        self.transport.close().await;
        self.mux.reject_all();
        self.flush.fail_all();
        self.drain.fail(RelayLinkError::ConnectionClosed);
        // Workers finish whatever is already queued and exit on their own
        // once the senders drop.
        drop(self.registry.finish_all());
        self.events.emit_disconnect(&DisconnectReason::new(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Draining,
            ConnectionState::Closed,
        ] {
            assert_eq!(ConnectionState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn test_unknown_state_value_maps_to_closed() {
        assert_eq!(ConnectionState::from_u8(42), ConnectionState::Closed);
    }
}
