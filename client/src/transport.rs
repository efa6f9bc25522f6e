//! Reconnecting WebSocket channel bound to one room.

use std::{sync::Arc, time::Instant};

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{interval_at, sleep, timeout, MissedTickBehavior},
};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    backoff::ReconnectPolicy,
    config::TransportConfig,
    error::TransportError,
    handlers::{fan_out, EventKind, Handler, HandlerRegistry, SubscriptionId, TransportEvent},
    identity::ParticipantIdentity,
    invite::RoomId,
    protocol::{decode_inbound, ClientMessage, Inbound},
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection status as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32, max_attempts: u32 },
    /// Reconnection gave up or the transport was shut down
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Open,
    Backoff,
    Failed,
    Terminated,
}

struct Link {
    generation: u64,
    phase: Phase,
    room: Option<RoomId>,
    identity: Option<ParticipantIdentity>,
    outbound: Option<mpsc::UnboundedSender<WsMessage>>,
    stop: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct Stats {
    bytes_out: u64,
    bytes_in: u64,
    messages_out: u64,
    messages_in: u64,
    last_message_at: Option<Instant>,
    last_ping_sent: Option<Instant>,
    last_ping_nonce: Option<u64>,
    last_rtt_ms: Option<f32>,
    last_disconnect_at: Option<Instant>,
    disconnects: u32,
    connected_since: Option<Instant>,
    /// Which connection `connected_since` belongs to
    connected_generation: u64,
    endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TransportStats {
    pub bytes_out: u64,
    pub bytes_in: u64,
    pub messages_out: u64,
    pub messages_in: u64,
    pub last_rtt_ms: Option<f32>,
    pub last_message_age: Option<f32>,
    pub connected_duration: Option<f32>,
    pub disconnects: u32,
    pub endpoint: Option<String>,
    pub last_disconnect_secs: Option<f32>,
}

/// Why a live connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Stopped,
    Lost,
}

struct Shared {
    config: TransportConfig,
    link: Mutex<Link>,
    handlers: Mutex<HandlerRegistry>,
    stats: Mutex<Stats>,
    status: watch::Sender<ConnectionStatus>,
}

/// Room transport handle. Clones share one connection.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Shared>,
}

impl Transport {
    pub fn new(config: TransportConfig) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        Self {
            inner: Arc::new(Shared {
                config,
                link: Mutex::new(Link {
                    generation: 0,
                    phase: Phase::Idle,
                    room: None,
                    identity: None,
                    outbound: None,
                    stop: None,
                }),
                handlers: Mutex::new(HandlerRegistry::default()),
                stats: Mutex::new(Stats::default()),
                status,
            }),
        }
    }

    /// `{server_url}/rooms/{room}/`
    pub fn room_url(&self, room: &RoomId) -> Result<String, TransportError> {
        let base = self.inner.config.server_url.trim_end_matches('/');
        let url = format!("{base}/rooms/{}/", urlencoding::encode(room.as_str()));
        match Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => Ok(url),
            _ => Err(TransportError::InvalidAddress(url)),
        }
    }

    /// Open (or reopen) the channel to `room`. A no-op while an attempt for
    /// the same room is in flight; any other live connection is closed first
    /// without triggering its reconnection.
    pub async fn connect(
        &self,
        room: &RoomId,
        identity: &ParticipantIdentity,
    ) -> Result<(), TransportError> {
        let url = self.room_url(room)?;

        let (replaced, generation) = {
            let mut link = self.inner.link.lock();
            if link.phase == Phase::Terminated {
                return Err(TransportError::Terminated);
            }
            if link.phase == Phase::Connecting && link.room.as_ref() == Some(room) {
                debug!(%room, "Connection attempt already in flight");
                return Ok(());
            }

            let replaced = match link.stop.take() {
                Some(stop) => {
                    let _ = stop.send(());
                    true
                }
                None => false,
            };
            link.generation += 1;
            link.phase = Phase::Connecting;
            link.room = Some(room.clone());
            link.identity = Some(identity.clone());
            link.outbound = None;
            (replaced, link.generation)
        };
        self.inner.status.send_replace(ConnectionStatus::Connecting);

        if replaced {
            debug!("Closing previous connection before reconnecting");
            sleep(self.inner.config.replace_grace_delay).await;
        }

        let stop_rx = {
            let mut link = self.inner.link.lock();
            if link.generation != generation {
                // Superseded during the grace delay
                return match link.phase {
                    Phase::Terminated => Err(TransportError::Terminated),
                    _ => Ok(()),
                };
            }
            let (stop_tx, stop_rx) = oneshot::channel();
            link.stop = Some(stop_tx);
            stop_rx
        };

        info!(%room, %url, "Connecting to room");
        let shared = Arc::clone(&self.inner);
        tokio::spawn(supervise(shared, generation, url, stop_rx));
        Ok(())
    }

    /// Queue a message. Fails fast with `NotReady` unless the channel is open;
    /// nothing is buffered.
    pub fn send(&self, message: &ClientMessage) -> Result<(), TransportError> {
        let tx = {
            let link = self.inner.link.lock();
            match (link.phase, &link.outbound) {
                (Phase::Open, Some(tx)) => tx.clone(),
                (Phase::Terminated, _) => return Err(TransportError::Terminated),
                _ => {
                    warn!("Cannot send {message:?}: channel not ready");
                    return Err(TransportError::NotReady);
                }
            }
        };
        let json = serde_json::to_string(message)?;
        let len = json.len() as u64;
        tx.send(WsMessage::Text(json.into()))
            .map_err(|_| TransportError::NotReady)?;
        self.inner.record_outgoing(len);
        Ok(())
    }

    /// Identity used by the next `join`; does not touch the live connection
    pub fn set_identity(&self, identity: &ParticipantIdentity) {
        self.inner.link.lock().identity = Some(identity.clone());
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&TransportEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.inner.handlers.lock().subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.handlers.lock().unsubscribe(id)
    }

    /// Close for good: no reconnection, no handlers, no further connects
    pub fn disconnect(&self) {
        let stop = {
            let mut link = self.inner.link.lock();
            if link.phase == Phase::Terminated {
                return;
            }
            link.phase = Phase::Terminated;
            link.generation += 1;
            link.outbound = None;
            link.stop.take()
        };
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        self.inner.handlers.lock().clear();
        self.inner.status.send_replace(ConnectionStatus::Disconnected);
        info!("Transport disconnected");
    }

    pub fn is_open(&self) -> bool {
        self.inner.link.lock().phase == Phase::Open
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status.subscribe()
    }

    pub fn stats_snapshot(&self) -> TransportStats {
        self.inner.snapshot()
    }
}

/// Connect, pump, and reconnect until stopped or out of attempts
async fn supervise(
    shared: Arc<Shared>,
    generation: u64,
    url: String,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut policy = ReconnectPolicy::new(
        shared.config.reconnect_base_delay,
        shared.config.max_reconnect_attempts,
    );

    loop {
        if !shared.set_phase(generation, Phase::Connecting) {
            return;
        }

        let attempt = tokio::select! {
            _ = &mut stop_rx => return,
            result = connect_async(url.as_str()) => result,
        };

        let end = match attempt {
            Ok((socket, _)) => {
                policy.reset();
                shared.run_connection(generation, &url, socket, &mut stop_rx).await
            }
            Err(e) => {
                warn!("Failed to connect to {url}: {e}");
                shared.dispatch(&TransportEvent::Error(e.to_string()));
                ConnectionEnd::Lost
            }
        };

        shared.on_closed(generation);
        if end == ConnectionEnd::Stopped {
            return;
        }

        let Some(delay) = policy.next_delay() else {
            warn!(
                attempts = policy.attempts(),
                "Reconnection attempts exhausted; giving up"
            );
            shared.mark_failed(generation);
            return;
        };

        let (attempt, max_attempts) = (policy.attempts(), policy.max_attempts());
        if !shared.begin_backoff(generation, attempt, max_attempts) {
            return;
        }
        info!("Reconnecting in {delay:?} (attempt {attempt}/{max_attempts})");
        shared.dispatch(&TransportEvent::Reconnecting {
            attempt,
            max_attempts,
        });

        tokio::select! {
            _ = &mut stop_rx => return,
            _ = sleep(delay) => {}
        }
    }
}

impl Shared {
    async fn run_connection(
        &self,
        generation: u64,
        url: &str,
        socket: Socket,
        stop_rx: &mut oneshot::Receiver<()>,
    ) -> ConnectionEnd {
        let (mut ws_sender, mut ws_receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

        // Join is queued before anyone else can get hold of the sender
        let join = {
            let link = self.link.lock();
            link.identity.as_ref().map(|identity| ClientMessage::Join {
                username: identity.name().to_string(),
            })
        };
        if let Some(join) = join {
            match serde_json::to_string(&join) {
                Ok(json) => {
                    self.record_outgoing(json.len() as u64);
                    let _ = tx.send(WsMessage::Text(json.into()));
                }
                Err(e) => warn!("Failed to encode join: {e}"),
            }
        }

        let mut writer: JoinHandle<()> = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if ws_sender.send(msg).await.is_err() || closing {
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        if !self.mark_open(generation, url, tx.clone()) {
            writer.abort();
            return ConnectionEnd::Stopped;
        }
        info!("Connected to {url}");
        self.dispatch(&TransportEvent::Connected);

        let keepalive = self.config.keepalive_interval;
        let mut ticker = interval_at(tokio::time::Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                _ = &mut *stop_rx => {
                    let _ = tx.send(WsMessage::Close(None));
                    break ConnectionEnd::Stopped;
                }
                _ = &mut writer => {
                    debug!("Socket writer finished");
                    break ConnectionEnd::Lost;
                }
                _ = ticker.tick() => {
                    let _ = tx.send(self.keepalive_ping());
                }
                frame = ws_receiver.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        self.record_incoming(text.len() as u64);
                        if self.is_current(generation) {
                            self.handle_text(&text);
                        }
                    }
                    Some(Ok(WsMessage::Pong(payload))) => self.handle_ws_pong(&payload),
                    Some(Ok(WsMessage::Close(frame))) => {
                        debug!(?frame, "Server closed the connection");
                        break ConnectionEnd::Lost;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        self.dispatch(&TransportEvent::Error(e.to_string()));
                        break ConnectionEnd::Lost;
                    }
                    None => break ConnectionEnd::Lost,
                },
            }
        };

        drop(tx);
        self.clear_outbound(generation);
        if end == ConnectionEnd::Stopped && !writer.is_finished() {
            // Let the close frame go out, but never hang on a dead peer
            let _ = timeout(self.config.replace_grace_delay, &mut writer).await;
        }
        writer.abort();
        end
    }

    fn handle_text(&self, text: &str) {
        match decode_inbound(text) {
            Some(Inbound::Known(message)) => {
                debug!(kind = ?message.kind(), "Received message");
                self.dispatch(&TransportEvent::Message(message));
            }
            Some(Inbound::Unknown { kind, payload }) => {
                debug!(%kind, "Received message of unknown type");
                self.dispatch(&TransportEvent::Unknown { kind, payload });
            }
            None => {}
        }
    }

    /// Handlers run outside the registry lock so they may (un)subscribe
    fn dispatch(&self, event: &TransportEvent) {
        let handlers = self.handlers.lock().matching(event);
        if !handlers.is_empty() {
            fan_out(&handlers, event);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link.lock().generation == generation
    }

    fn set_phase(&self, generation: u64, phase: Phase) -> bool {
        let mut link = self.link.lock();
        if link.generation != generation {
            return false;
        }
        link.phase = phase;
        true
    }

    fn mark_open(&self, generation: u64, url: &str, tx: mpsc::UnboundedSender<WsMessage>) -> bool {
        {
            let mut link = self.link.lock();
            if link.generation != generation {
                return false;
            }
            link.phase = Phase::Open;
            link.outbound = Some(tx);
        }
        {
            let mut stats = self.stats.lock();
            stats.connected_since = Some(Instant::now());
            stats.connected_generation = generation;
            stats.endpoint = Some(url.to_string());
        }
        self.status.send_replace(ConnectionStatus::Connected);
        true
    }

    fn clear_outbound(&self, generation: u64) {
        let mut link = self.link.lock();
        if link.generation == generation {
            link.outbound = None;
        }
    }

    fn on_closed(&self, generation: u64) {
        {
            let mut stats = self.stats.lock();
            // A replaced connection may close after its successor opened
            if stats.connected_generation == generation {
                if stats.connected_since.take().is_some() {
                    stats.disconnects += 1;
                    stats.last_disconnect_at = Some(Instant::now());
                }
                stats.last_ping_nonce = None;
                stats.last_ping_sent = None;
            }
        }
        self.dispatch(&TransportEvent::Closed);
    }

    fn begin_backoff(&self, generation: u64, attempt: u32, max_attempts: u32) -> bool {
        if !self.set_phase(generation, Phase::Backoff) {
            return false;
        }
        self.status.send_replace(ConnectionStatus::Reconnecting {
            attempt,
            max_attempts,
        });
        true
    }

    fn mark_failed(&self, generation: u64) {
        {
            let mut link = self.link.lock();
            if link.generation != generation {
                return;
            }
            link.phase = Phase::Failed;
            // Nothing left to stop; a later connect is a fresh start
            link.stop = None;
        }
        self.status.send_replace(ConnectionStatus::Disconnected);
    }

    fn record_outgoing(&self, bytes: u64) {
        let mut stats = self.stats.lock();
        stats.bytes_out += bytes;
        stats.messages_out += 1;
        stats.last_message_at = Some(Instant::now());
    }

    fn record_incoming(&self, bytes: u64) {
        let mut stats = self.stats.lock();
        stats.bytes_in += bytes;
        stats.messages_in += 1;
        stats.last_message_at = Some(Instant::now());
    }

    fn keepalive_ping(&self) -> WsMessage {
        let nonce = Uuid::new_v4().as_u128() as u64;
        {
            let mut stats = self.stats.lock();
            stats.last_ping_nonce = Some(nonce);
            stats.last_ping_sent = Some(Instant::now());
        }
        let payload = nonce.to_le_bytes().to_vec();
        self.record_outgoing(payload.len() as u64);
        WsMessage::Ping(payload.into())
    }

    fn handle_ws_pong(&self, payload: &[u8]) {
        self.record_incoming(payload.len() as u64);
        let Some(nonce_bytes) = payload.get(..8) else {
            return;
        };
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(nonce_bytes);
        let nonce = u64::from_le_bytes(bytes);

        let mut stats = self.stats.lock();
        if stats.last_ping_nonce == Some(nonce) {
            if let Some(sent) = stats.last_ping_sent {
                stats.last_rtt_ms = Some(sent.elapsed().as_secs_f32() * 1000.0);
            }
            stats.last_ping_nonce = None;
            stats.last_ping_sent = None;
        }
    }

    fn snapshot(&self) -> TransportStats {
        let stats = self.stats.lock();
        TransportStats {
            bytes_out: stats.bytes_out,
            bytes_in: stats.bytes_in,
            messages_out: stats.messages_out,
            messages_in: stats.messages_in,
            last_rtt_ms: stats.last_rtt_ms,
            last_message_age: stats.last_message_at.map(|at| at.elapsed().as_secs_f32()),
            connected_duration: stats.connected_since.map(|at| at.elapsed().as_secs_f32()),
            disconnects: stats.disconnects,
            endpoint: stats.endpoint.clone(),
            last_disconnect_secs: stats
                .last_disconnect_at
                .map(|at| at.elapsed().as_secs_f32()),
        }
    }
}
