//! One joined room: a transport, a coordinator, and the task that serializes
//! everything between them.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{sleep_until, Instant},
};
use tracing::{debug, info, trace, warn};

use crate::{
    config::{ClientConfig, SyncConfig},
    constants::MAX_CHAT_CHARS,
    coordinator::SyncCoordinator,
    error::SessionError,
    handlers::{EventKind, TransportEvent},
    identity::ParticipantIdentity,
    invite::RoomId,
    media::MediaSource,
    player::{AdapterFactory, BackendEnvelope, BackendHost, HostAdapterFactory, Readiness},
    protocol::{ClientMessage, ServerMessage, SyncEvent},
    transport::{ConnectionStatus, Transport},
};

/// Point-in-time view of local playback
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub source: Option<MediaSource>,
    pub title: Option<String>,
    pub is_playing: bool,
    pub current_time: f64,
    pub readiness: Option<Readiness>,
    pub suppressing: bool,
}

enum Command {
    ChangeVideo {
        url: String,
        title: Option<String>,
    },
    Inspect(oneshot::Sender<PlaybackSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// Transport events forwarded into the session loop
const SESSION_EVENTS: [EventKind; 5] = [
    EventKind::AnyMessage,
    EventKind::Connected,
    EventKind::Reconnecting,
    EventKind::Closed,
    EventKind::Error,
];

pub struct RoomSession {
    room: RoomId,
    identity: Mutex<ParticipantIdentity>,
    transport: Transport,
    commands: mpsc::UnboundedSender<Command>,
    participants: watch::Receiver<Vec<String>>,
    task: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Join `room` with adapters backed by `host`
    pub async fn join(
        config: &ClientConfig,
        room: RoomId,
        identity: ParticipantIdentity,
        host: Arc<dyn BackendHost>,
    ) -> Result<Self, SessionError> {
        let (backend_tx, backend_rx) = mpsc::unbounded_channel();
        let factory = HostAdapterFactory::new(host, config.adapter.clone(), backend_tx);
        Self::start(
            room,
            identity,
            Transport::new(config.transport.clone()),
            Box::new(factory),
            backend_rx,
            config.sync.clone(),
        )
        .await
    }

    /// Join with an explicit transport and adapter factory. Backend events for
    /// the factory's adapters must arrive on `backend_events`.
    pub async fn start(
        room: RoomId,
        identity: ParticipantIdentity,
        transport: Transport,
        factory: Box<dyn AdapterFactory>,
        backend_events: mpsc::UnboundedReceiver<BackendEnvelope>,
        sync: SyncConfig,
    ) -> Result<Self, SessionError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        for kind in SESSION_EVENTS {
            let tx = event_tx.clone();
            transport.subscribe(kind, move |event| {
                tx.send(event.clone())
                    .map_err(|_| anyhow::anyhow!("room session loop has stopped"))
            });
        }

        let coordinator = SyncCoordinator::new(sync, factory, Box::new(transport.clone()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (participants_tx, participants_rx) = watch::channel(Vec::new());

        let task = tokio::spawn(run_session(
            coordinator,
            transport.clone(),
            command_rx,
            event_rx,
            backend_events,
            participants_tx,
        ));

        if let Err(e) = transport.connect(&room, &identity).await {
            // Dropping the command sender stops the loop
            transport.disconnect();
            return Err(e.into());
        }

        Ok(Self {
            room,
            identity: Mutex::new(identity),
            transport,
            commands: command_tx,
            participants: participants_rx,
            task: Some(task),
        })
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    pub fn identity(&self) -> ParticipantIdentity {
        self.identity.lock().clone()
    }

    /// The underlying transport, for subscribing to chat and other messages
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.transport.watch_status()
    }

    pub fn participants(&self) -> watch::Receiver<Vec<String>> {
        self.participants.clone()
    }

    /// Pick a new video for the whole room
    pub fn change_video(&self, url: &str, title: Option<String>) -> Result<(), SessionError> {
        self.command(Command::ChangeVideo {
            url: url.to_string(),
            title,
        })
    }

    /// Takes effect for future joins even when the channel is down
    pub fn rename(&self, identity: ParticipantIdentity) -> Result<(), SessionError> {
        self.transport.set_identity(&identity);
        *self.identity.lock() = identity.clone();
        if !self.transport.is_open() {
            debug!("Not connected; new name will be sent on the next join");
            return Ok(());
        }
        self.transport.send(&ClientMessage::UsernameChange {
            username: identity.name().to_string(),
        })?;
        Ok(())
    }

    pub fn send_chat(&self, text: &str) -> Result<(), SessionError> {
        let content = validate_chat(text)?;
        self.transport.send(&ClientMessage::Chat { content })?;
        Ok(())
    }

    /// Reconnect explicitly, e.g. after automatic reconnection gave up
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let identity = self.identity();
        info!(room = %self.room, "Manual reconnect requested");
        self.transport.connect(&self.room, &identity).await?;
        Ok(())
    }

    pub async fn playback(&self) -> Result<PlaybackSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.command(Command::Inspect(tx))?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Leave the room and wait until nothing of it is left running
    pub async fn leave(mut self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(tx)).is_ok() {
            let _ = rx.await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| SessionError::Closed)
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.commands.send(Command::Shutdown(oneshot::channel().0));
        }
    }
}

/// Trimmed chat content, or why it cannot be sent
pub fn validate_chat(text: &str) -> Result<String, SessionError> {
    let content = text.trim();
    if content.is_empty() {
        return Err(SessionError::EmptyChat);
    }
    let len = content.chars().count();
    if len > MAX_CHAT_CHARS {
        return Err(SessionError::ChatTooLong {
            len,
            max: MAX_CHAT_CHARS,
        });
    }
    Ok(content.to_string())
}

async fn run_session(
    mut coordinator: SyncCoordinator,
    transport: Transport,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    mut backend_events: mpsc::UnboundedReceiver<BackendEnvelope>,
    participants: watch::Sender<Vec<String>>,
) {
    let done = loop {
        let deadline = coordinator.suppression_deadline();
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::ChangeVideo { url, title }) => coordinator.change_source(&url, title),
                Some(Command::Inspect(reply)) => {
                    let _ = reply.send(PlaybackSnapshot {
                        source: coordinator.source().cloned(),
                        title: coordinator.title().map(str::to_string),
                        is_playing: coordinator.is_playing(),
                        current_time: coordinator.current_time(),
                        readiness: coordinator.adapter_readiness(),
                        suppressing: coordinator.is_suppressing(),
                    });
                }
                Some(Command::Shutdown(done)) => break Some(done),
                None => break None,
            },
            Some(event) = transport_events.recv() => {
                on_transport_event(&mut coordinator, &participants, event);
            }
            Some((id, event)) = backend_events.recv() => coordinator.handle_backend(id, event),
            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                coordinator.release_suppression();
            }
        }
    };

    transport.disconnect();
    coordinator.teardown();
    drop(coordinator);
    info!("Left room");
    if let Some(done) = done {
        let _ = done.send(());
    }
}

fn on_transport_event(
    coordinator: &mut SyncCoordinator,
    participants: &watch::Sender<Vec<String>>,
    event: TransportEvent,
) {
    match event {
        TransportEvent::Message(message) => match message.to_sync_event() {
            Some(SyncEvent::ParticipantListChanged { names }) => {
                debug!(count = names.len(), "Participants updated");
                participants.send_replace(names);
            }
            Some(sync) => coordinator.handle_remote(sync),
            None => log_chat(&message),
        },
        TransportEvent::Connected => info!("Connected to room"),
        TransportEvent::Reconnecting {
            attempt,
            max_attempts,
        } => info!("Connection lost; reconnecting ({attempt}/{max_attempts})"),
        TransportEvent::Closed => debug!("Room connection closed"),
        TransportEvent::Error(e) => warn!("Room connection error: {e}"),
        TransportEvent::Unknown { kind, .. } => trace!(%kind, "Ignoring unknown room message"),
    }
}

fn log_chat(message: &ServerMessage) {
    match message {
        ServerMessage::ChatMessage(entry) => debug!(from = %entry.username, "Chat message"),
        ServerMessage::ChatHistory { messages } => debug!(count = messages.len(), "Chat history"),
        ServerMessage::ChatError { error } => warn!("Chat rejected: {error}"),
        _ => {}
    }
}
