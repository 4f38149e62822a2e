//! Connection manager: public handle and driver task.
//!
//! [`TetherClient`] is a cheap-to-clone handle. All mutation happens on a
//! single driver task that owns the transport, the outbound queue, the
//! backoff counter and the pending-request table, and reacts to exactly one
//! thing at a time: a caller command, an inbound frame, a heartbeat tick, a
//! reconnect deadline, or a platform signal. Handlers therefore never
//! re-enter each other, and the transport handle is owned exclusively:
//! replaced wholesale on each reconnect, never shared.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, info, warn};

use tether_core::envelope::{now_millis, PING_TYPE};
use tether_core::logging::init_logging;
use tether_core::{
    Backoff, ClientError, ConnectionState, ConnectionStats, Envelope, RequestId, Result,
    TetherSettings, TransportError,
};

use crate::bus::{ClientEvent, EventBus, EventFilter, Subscription};
use crate::correlator::Correlator;
use crate::heartbeat::{heartbeat_interval, probe_channel, spawn_probe};
use crate::platform::{PlatformReceiver, PlatformSignal};
use crate::queue::OutboundQueue;
use crate::transport::{Connector, Transport, WsConnector};

/// State and counters shared between handles and the driver.
///
/// The driver is the only writer; handles take read snapshots.
#[derive(Clone)]
pub struct SharedState {
    pub(crate) state: Arc<RwLock<ConnectionState>>,
    pub(crate) stats: Arc<RwLock<ConnectionStats>>,
    pub(crate) bus: EventBus,
}

impl SharedState {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            stats: Arc::new(RwLock::new(ConnectionStats::default())),
            bus: EventBus::new(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.read()
    }
}

enum Command {
    Connect {
        ack: oneshot::Sender<Result<()>>,
    },
    Disconnect,
    Send {
        envelope: Envelope,
        ack: oneshot::Sender<Result<()>>,
    },
    Request {
        id: RequestId,
        envelope: Envelope,
        reply: crate::correlator::ReplySender,
    },
    Ping {
        reply: oneshot::Sender<Result<u64>>,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Configures and spawns a [`TetherClient`].
pub struct ClientBuilder {
    settings: TetherSettings,
    connector: Arc<dyn Connector>,
    platform_rx: Option<PlatformReceiver>,
}

impl ClientBuilder {
    /// Start from settings, with the production WebSocket connector.
    #[must_use]
    pub fn new(settings: TetherSettings) -> Self {
        Self {
            settings,
            connector: Arc::new(WsConnector),
            platform_rx: None,
        }
    }

    /// Replace the transport factory (tests inject fakes here).
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Attach a platform signal feed (visibility / connectivity).
    #[must_use]
    pub fn platform(mut self, rx: PlatformReceiver) -> Self {
        self.platform_rx = Some(rx);
        self
    }

    /// Validate settings and spawn the driver task.
    pub fn spawn(self) -> Result<TetherClient> {
        self.settings.validate()?;
        init_logging(self.settings.enable_logging);

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let shared = SharedState::new();
        let (_unused_tx, default_rx) = mpsc::unbounded_channel();
        let platform_rx = self.platform_rx.unwrap_or(default_rx);

        let driver = Driver {
            correlator: Correlator::new(Duration::from_millis(self.settings.message_timeout_ms)),
            heartbeat: heartbeat_interval(Duration::from_millis(
                self.settings.heartbeat_interval_ms,
            )),
            backoff: Backoff::new(
                self.settings.reconnect_interval_ms,
                self.settings.backoff_cap_ms,
            ),
            settings: self.settings,
            connector: self.connector,
            shared: shared.clone(),
            cmd_rx,
            platform_rx,
            platform_closed: false,
            transport: None,
            dial: None,
            queue: OutboundQueue::new(),
            reconnect: None,
            visible: true,
            connect_waiters: Vec::new(),
        };
        drop(tokio::spawn(driver.run()));

        Ok(TetherClient { cmd_tx, shared })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one logical duplex channel.
///
/// Clones share the same connection. The driver shuts down when the last
/// handle is dropped.
#[derive(Clone)]
pub struct TetherClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: SharedState,
}

impl TetherClient {
    /// Spawn a client with the production WebSocket transport.
    pub fn new(settings: TetherSettings) -> Result<Self> {
        ClientBuilder::new(settings).spawn()
    }

    /// Configure connector or platform feed before spawning.
    #[must_use]
    pub fn builder(settings: TetherSettings) -> ClientBuilder {
        ClientBuilder::new(settings)
    }

    /// Open the connection.
    ///
    /// No-op when already connected. Otherwise resolves when the connect
    /// cycle reaches a terminal outcome: `Ok` once connected,
    /// [`ClientError::MaxAttemptsReached`] when retries are exhausted, or
    /// [`ClientError::ConnectionClosed`] if `disconnect()` interrupts it.
    pub async fn connect(&self) -> Result<()> {
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Connect { ack })
            .map_err(|_| ClientError::ConnectionClosed)?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Tear the connection down.
    ///
    /// The single cancellation point: safe from any state, including
    /// mid-backoff. Pending requests are rejected with
    /// [`ClientError::ConnectionClosed`]; queued fire-and-forget messages
    /// are kept for the next connection. Idempotent.
    pub fn disconnect(&self) {
        let _ = self.cmd_tx.send(Command::Disconnect);
    }

    /// Fire-and-forget send.
    ///
    /// Connected: written immediately. Not connected: queued and resolved
    /// immediately (best effort, flushed FIFO on reconnect).
    pub async fn send(&self, message_type: impl Into<String>, payload: Value) -> Result<()> {
        let envelope = Envelope::broadcast(message_type, payload);
        let (ack, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Send { envelope, ack })
            .map_err(|_| ClientError::ConnectionClosed)?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Correlated request; resolves with the matching reply's payload.
    ///
    /// Rejected immediately with [`ClientError::NotConnected`] while not
    /// connected (the timeout clock would be meaningless offline), and with
    /// [`ClientError::Timeout`] if no reply lands within the window.
    pub async fn request(&self, message_type: impl Into<String>, payload: Value) -> Result<Value> {
        let id = RequestId::new();
        let envelope = Envelope {
            message_type: message_type.into(),
            payload,
            timestamp: now_millis(),
            id: Some(id.clone()),
        };
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Request { id, envelope, reply })
            .map_err(|_| ClientError::ConnectionClosed)?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Send a heartbeat probe now; resolves with the round trip in ms.
    pub async fn ping(&self) -> Result<u64> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Ping { reply })
            .map_err(|_| ClientError::ConnectionClosed)?;
        rx.await.map_err(|_| ClientError::ConnectionClosed)?
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Snapshot of the connection counters.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.shared.stats.read().clone()
    }

    /// Subscribe to client events matching `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        self.shared.bus.subscribe(filter)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

type DialFuture =
    Pin<Box<dyn Future<Output = std::result::Result<Box<dyn Transport>, TransportError>> + Send>>;

enum Step {
    Cmd(Option<Command>),
    Frame(Option<std::result::Result<String, TransportError>>),
    Dialed(std::result::Result<Box<dyn Transport>, TransportError>),
    Retry,
    Heartbeat,
    Platform(Option<PlatformSignal>),
}

struct Driver {
    settings: TetherSettings,
    connector: Arc<dyn Connector>,
    shared: SharedState,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    platform_rx: PlatformReceiver,
    platform_closed: bool,
    transport: Option<Box<dyn Transport>>,
    dial: Option<DialFuture>,
    queue: OutboundQueue,
    backoff: Backoff,
    correlator: Correlator,
    heartbeat: tokio::time::Interval,
    reconnect: Option<Pin<Box<Sleep>>>,
    visible: bool,
    connect_waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            let heartbeat_due = self.shared.state().is_connected() && self.visible;
            let platform_open = !self.platform_closed;

            let step = tokio::select! {
                cmd = self.cmd_rx.recv() => Step::Cmd(cmd),
                frame = next_frame(&mut self.transport) => Step::Frame(frame),
                result = poll_dial(&mut self.dial) => Step::Dialed(result),
                () = wait_deadline(&mut self.reconnect) => Step::Retry,
                _ = self.heartbeat.tick(), if heartbeat_due => Step::Heartbeat,
                sig = self.platform_rx.recv(), if platform_open => Step::Platform(sig),
            };

            match step {
                Step::Cmd(Some(cmd)) => self.on_command(cmd).await,
                Step::Cmd(None) => {
                    // Last handle dropped.
                    self.teardown();
                    break;
                }
                Step::Frame(Some(Ok(text))) => self.on_frame(&text),
                Step::Frame(Some(Err(err))) => self.on_transport_lost(&err).await,
                Step::Frame(None) => self.on_peer_close(),
                Step::Dialed(result) => {
                    self.dial = None;
                    match result {
                        Ok(transport) => self.on_connected(transport).await,
                        Err(err) => {
                            warn!(error = %err, "dial failed");
                            self.schedule_reconnect();
                        }
                    }
                }
                Step::Retry => {
                    self.reconnect = None;
                    self.start_dial();
                }
                Step::Heartbeat => self.send_heartbeat().await,
                Step::Platform(Some(sig)) => self.on_platform(sig),
                Step::Platform(None) => self.platform_closed = true,
            }
        }
    }

    // ── Commands ─────────────────────────────────────────────────────────

    async fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect { ack } => self.on_connect_cmd(ack),
            Command::Disconnect => self.on_disconnect_cmd(),
            Command::Send { envelope, ack } => self.on_send_cmd(envelope, ack).await,
            Command::Request { id, envelope, reply } => {
                self.on_request_cmd(id, envelope, reply).await;
            }
            Command::Ping { reply } => self.on_ping_cmd(reply).await,
        }
    }

    fn on_connect_cmd(&mut self, ack: oneshot::Sender<Result<()>>) {
        match self.shared.state() {
            ConnectionState::Connected => {
                let _ = ack.send(Ok(()));
            }
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                // Join the cycle already in flight.
                self.connect_waiters.push(ack);
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                // A fresh explicit cycle: the attempt counter starts over.
                self.backoff.reset();
                self.shared.stats.write().reconnect_count = 0;
                self.set_state(ConnectionState::Connecting);
                self.connect_waiters.push(ack);
                self.start_dial();
            }
        }
    }

    fn on_disconnect_cmd(&mut self) {
        if self.shared.state() == ConnectionState::Disconnected {
            return;
        }
        info!("disconnecting");
        self.teardown();
    }

    async fn on_send_cmd(&mut self, envelope: Envelope, ack: oneshot::Sender<Result<()>>) {
        if self.shared.state().is_connected() {
            match self.write(&envelope).await {
                Ok(()) => {
                    let _ = ack.send(Ok(()));
                }
                Err(err) => {
                    // Keep the message for the next flush; best effort.
                    self.queue.push(envelope);
                    let _ = ack.send(Ok(()));
                    self.on_transport_lost(&err).await;
                }
            }
        } else {
            debug!(queued = self.queue.len() + 1, "queueing message while offline");
            self.queue.push(envelope);
            let _ = ack.send(Ok(()));
        }
    }

    async fn on_request_cmd(
        &mut self,
        id: RequestId,
        envelope: Envelope,
        reply: crate::correlator::ReplySender,
    ) {
        if !self.shared.state().is_connected() {
            let _ = reply.send(Err(ClientError::NotConnected));
            return;
        }
        self.correlator.insert(id.clone(), reply);
        if let Err(err) = self.write(&envelope).await {
            let _ = self
                .correlator
                .fail(&id, ClientError::Transport(TransportError::Io(err.to_string())));
            self.on_transport_lost(&err).await;
        }
    }

    async fn on_ping_cmd(&mut self, reply: oneshot::Sender<Result<u64>>) {
        if !self.shared.state().is_connected() {
            let _ = reply.send(Err(ClientError::NotConnected));
            return;
        }
        self.probe(Some(reply)).await;
    }

    // ── Connecting and retrying ──────────────────────────────────────────

    /// Kick off a dial without blocking the loop.
    ///
    /// The in-flight future is polled as its own select arm, so commands
    /// (notably `Disconnect`) stay responsive during a slow dial; teardown
    /// cancels it by dropping the future.
    fn start_dial(&mut self) {
        debug!(url = %self.settings.url, attempt = self.backoff.attempt(), "dialing");
        let connector = Arc::clone(&self.connector);
        let url = self.settings.url.clone();
        self.dial = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn on_connected(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
        self.backoff.reset();
        self.shared.stats.write().connected_at = Some(now_millis());
        self.heartbeat =
            heartbeat_interval(Duration::from_millis(self.settings.heartbeat_interval_ms));
        self.set_state(ConnectionState::Connected);
        info!(url = %self.settings.url, "connected");

        // Queued writes flush before any new sends for this cycle; commands
        // queued behind this handler keep that ordering. Envelopes are popped
        // one at a time so an interrupted flush keeps the unsent remainder.
        let mut flushed = 0usize;
        while let Some(envelope) = self.queue.pop() {
            if let Err(err) = self.write(&envelope).await {
                warn!(error = %err, flushed, remaining = self.queue.len() + 1, "flush interrupted");
                self.queue.push_front(envelope);
                self.on_transport_lost(&err).await;
                return;
            }
            flushed += 1;
        }
        if flushed > 0 {
            debug!(flushed, "outbound queue drained");
        }

        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    fn schedule_reconnect(&mut self) {
        self.transport = None;
        let delay = self.backoff.next_delay();
        let attempt = self.backoff.attempt();

        if attempt > self.settings.max_reconnect_attempts {
            warn!(attempts = attempt - 1, "reconnect attempts exhausted");
            self.set_state(ConnectionState::Error);
            self.shared.bus.publish(&ClientEvent::MaxReconnectAttemptsReached);
            for waiter in self.connect_waiters.drain(..) {
                let _ = waiter.send(Err(ClientError::MaxAttemptsReached {
                    attempts: attempt - 1,
                }));
            }
            return;
        }

        self.shared.stats.write().reconnect_count += 1;
        self.set_state(ConnectionState::Reconnecting);
        debug!(attempt, ?delay, "reconnect scheduled");
        self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
    }

    async fn on_transport_lost(&mut self, err: &TransportError) {
        if self.shared.state() == ConnectionState::Disconnected {
            return;
        }
        warn!(error = %err, "transport lost");
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        // Pending requests ride out the gap; their own timeouts clean up.
        self.schedule_reconnect();
    }

    /// Peer closed gracefully: no retry, plain teardown.
    fn on_peer_close(&mut self) {
        info!("peer closed the connection");
        self.teardown();
    }

    /// Move to `Disconnected`, cancel all timers, reject everything pending.
    fn teardown(&mut self) {
        self.reconnect = None;
        // Dropping an in-flight dial cancels it.
        self.dial = None;
        if let Some(transport) = self.transport.take() {
            // Graceful close runs detached so teardown stays prompt.
            drop(tokio::spawn(async move {
                let mut transport = transport;
                transport.close().await;
            }));
        }
        self.correlator.reject_all(|| ClientError::ConnectionClosed);
        for waiter in self.connect_waiters.drain(..) {
            let _ = waiter.send(Err(ClientError::ConnectionClosed));
        }
        self.shared.stats.write().connected_at = None;
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Traffic ──────────────────────────────────────────────────────────

    async fn write(&mut self, envelope: &Envelope) -> std::result::Result<(), TransportError> {
        let text = envelope
            .encode()
            .map_err(|e| TransportError::Io(format!("encode: {e}")))?;
        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::Io("no transport".into()));
        };
        let bytes = text.len();
        transport.send(text).await?;
        self.shared.stats.write().record_sent(bytes);
        Ok(())
    }

    fn on_frame(&mut self, text: &str) {
        self.shared.stats.write().record_received(text.len());
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, len = text.len(), "dropping malformed frame");
                return;
            }
        };
        if let Some(id) = &envelope.id {
            if self.correlator.resolve(id, envelope.payload.clone()) {
                return;
            }
            debug!(id = %id, "reply for unknown request id, treating as broadcast");
        }
        self.shared.bus.publish(&ClientEvent::Message(envelope));
    }

    async fn send_heartbeat(&mut self) {
        self.probe(None).await;
    }

    async fn probe(&mut self, reply: Option<oneshot::Sender<Result<u64>>>) {
        let id = RequestId::new();
        let envelope = Envelope {
            message_type: PING_TYPE.into(),
            payload: Value::Null,
            timestamp: now_millis(),
            id: Some(id.clone()),
        };
        let (tx, rx) = probe_channel();
        self.correlator.insert(id.clone(), tx);
        spawn_probe(rx, self.shared.clone(), reply);
        if let Err(err) = self.write(&envelope).await {
            let _ = self
                .correlator
                .fail(&id, ClientError::Transport(TransportError::Io(err.to_string())));
            self.on_transport_lost(&err).await;
        }
    }

    // ── Platform signals ─────────────────────────────────────────────────

    fn on_platform(&mut self, signal: PlatformSignal) {
        match signal {
            PlatformSignal::Visibility(visible) => {
                debug!(visible, "visibility changed");
                self.visible = visible;
            }
            PlatformSignal::Connectivity(true) => {
                if self.reconnect.is_some() {
                    debug!("connectivity restored, retrying now");
                    self.reconnect = None;
                    self.start_dial();
                }
            }
            PlatformSignal::Connectivity(false) => {
                debug!("connectivity lost");
            }
        }
    }

    // ── State machine ────────────────────────────────────────────────────

    fn set_state(&mut self, new: ConnectionState) {
        let old = {
            let mut state = self.shared.state.write();
            let old = *state;
            if old == new {
                return;
            }
            debug_assert!(old.can_transition_to(new), "illegal transition {old} -> {new}");
            *state = new;
            old
        };
        debug!(%old, %new, "state changed");
        self.shared
            .bus
            .publish(&ClientEvent::StateChanged { old, new });
    }
}

async fn next_frame(
    transport: &mut Option<Box<dyn Transport>>,
) -> Option<std::result::Result<String, TransportError>> {
    match transport.as_mut() {
        Some(transport) => transport.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn wait_deadline(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn poll_dial(
    dial: &mut Option<DialFuture>,
) -> std::result::Result<Box<dyn Transport>, TransportError> {
    match dial.as_mut() {
        Some(dial) => dial.as_mut().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builder_rejects_invalid_settings() {
        let settings = TetherSettings::for_url("http://not-a-ws");
        assert!(ClientBuilder::new(settings).spawn().is_err());
    }

    #[tokio::test]
    async fn fresh_client_is_disconnected_with_zero_stats() {
        let client = TetherClient::new(TetherSettings::for_url("ws://127.0.0.1:1/ws")).unwrap();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        let stats = client.stats();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.reconnect_count, 0);
    }

    #[tokio::test]
    async fn send_while_disconnected_resolves_immediately() {
        let client = TetherClient::new(TetherSettings::for_url("ws://127.0.0.1:1/ws")).unwrap();
        client.send("note", serde_json::json!({"n": 1})).await.unwrap();
        // Still disconnected; the envelope is parked in the queue.
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn request_while_disconnected_is_rejected() {
        let client = TetherClient::new(TetherSettings::for_url("ws://127.0.0.1:1/ws")).unwrap();
        let err = client.request("echo", serde_json::json!(1)).await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn ping_while_disconnected_is_rejected() {
        let client = TetherClient::new(TetherSettings::for_url("ws://127.0.0.1:1/ws")).unwrap();
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_before_connect_is_a_noop() {
        let client = TetherClient::new(TetherSettings::for_url("ws://127.0.0.1:1/ws")).unwrap();
        let mut states = client.subscribe(EventFilter::StateChanges);
        client.disconnect();
        client.disconnect();
        tokio::task::yield_now().await;
        assert!(states.try_recv().is_none());
    }
}
