//! Uniform control contract over heterogeneous video backends.
//!
//! Every backend family gets one adapter type. The coordinator only ever sees
//! `dyn PlayerAdapter`; which concrete adapter gets built is decided by
//! [`select_variant`] from the media kind alone.

mod backend;
mod detached;
mod frame;
mod native;
mod obrut;
mod playerjs;
pub mod youtube;

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    config::AdapterConfig,
    error::BackendError,
    media::{youtube_video_id, MediaKind, MediaSource},
};

pub use backend::{
    AdapterId, AdapterTimer, BackendEnvelope, BackendEvent, BackendHost, BackendSink,
    EmbeddedEvent, EmbeddedPlayer, FrameMessage, FramePayload, FrameWindow, MediaElement,
    MediaEvent, TimerGuard,
};
pub use detached::DetachedAdapter;
pub use frame::{origin_trusted, FrameAdapter, FrameProtocol, SignalKind};
pub use native::NativeAdapter;
pub use obrut::{ObrutAdapter, ObrutProtocol};
pub use playerjs::{PlayerJsAdapter, PlayerJsProtocol};
pub use youtube::YouTubeAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
    TornDown,
}

/// Canonical events every adapter raises
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AdapterEvent {
    Ready,
    Play,
    Pause,
    Progress(f64),
}

/// What the coordinator asks an adapter to do
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    Play,
    Pause,
    SeekTo(f64),
}

pub trait PlayerAdapter: Send {
    fn id(&self) -> AdapterId;

    fn kind(&self) -> MediaKind;

    fn readiness(&self) -> Readiness;

    /// Best effort; a no-op before `Ready` and after teardown
    fn play(&mut self);

    fn pause(&mut self);

    fn seek_to(&mut self, seconds: f64);

    /// Last known position, never a spurious 0 once a position is known
    fn current_time(&self) -> f64;

    /// Translate one raw backend notification into a canonical event
    fn handle_backend_event(&mut self, event: BackendEvent) -> Option<AdapterEvent>;

    /// Release the backend. Terminal.
    fn teardown(&mut self);

    fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Play => self.play(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::SeekTo(seconds) => self.seek_to(seconds),
        }
    }
}

/// Builds a fresh adapter for a source. Never fails: a backend that cannot
/// be created yields a detached adapter instead.
pub trait AdapterFactory: Send {
    fn create(&mut self, source: &MediaSource, id: AdapterId) -> Box<dyn PlayerAdapter>;
}

/// Adapter family chosen for a media kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterVariant {
    Native,
    YouTube,
    Obrut,
    PlayerJs,
    Detached,
}

pub fn select_variant(kind: MediaKind) -> AdapterVariant {
    match kind {
        MediaKind::NativeFile => AdapterVariant::Native,
        MediaKind::YouTube => AdapterVariant::YouTube,
        MediaKind::ObrutEmbed => AdapterVariant::Obrut,
        MediaKind::PlayerJsEmbed => AdapterVariant::PlayerJs,
        MediaKind::Unrecognized => AdapterVariant::Detached,
    }
}

/// Factory that asks a [`BackendHost`] for the underlying resources
pub struct HostAdapterFactory {
    host: Arc<dyn BackendHost>,
    config: AdapterConfig,
    events: mpsc::UnboundedSender<BackendEnvelope>,
}

impl HostAdapterFactory {
    pub fn new(
        host: Arc<dyn BackendHost>,
        config: AdapterConfig,
        events: mpsc::UnboundedSender<BackendEnvelope>,
    ) -> Self {
        Self {
            host,
            config,
            events,
        }
    }

    fn build(
        &self,
        source: &MediaSource,
        id: AdapterId,
    ) -> Result<Box<dyn PlayerAdapter>, BackendError> {
        let sink = BackendSink::new(id, self.events.clone());
        let adapter: Box<dyn PlayerAdapter> = match select_variant(source.kind) {
            AdapterVariant::Native => {
                let element = self.host.media_element(&source.url, sink)?;
                Box::new(NativeAdapter::new(id, element))
            }
            AdapterVariant::YouTube => {
                let video_id = youtube_video_id(&source.url)
                    .ok_or_else(|| BackendError::Rejected(format!("no video id in {}", source.url)))?;
                let player = self.host.embedded_player(&video_id, sink.clone())?;
                Box::new(YouTubeAdapter::new(
                    id,
                    player,
                    sink,
                    self.config.progress_poll_interval,
                ))
            }
            AdapterVariant::Obrut => {
                let window = self.host.frame(&source.url, sink.clone())?;
                Box::new(ObrutAdapter::new(id, window, &sink, &self.config))
            }
            AdapterVariant::PlayerJs => {
                let window = self.host.frame(&source.url, sink.clone())?;
                Box::new(PlayerJsAdapter::new(id, window, &sink, &self.config))
            }
            AdapterVariant::Detached => Box::new(DetachedAdapter::new(id, source.kind)),
        };
        Ok(adapter)
    }
}

impl AdapterFactory for HostAdapterFactory {
    fn create(&mut self, source: &MediaSource, id: AdapterId) -> Box<dyn PlayerAdapter> {
        match self.build(source, id) {
            Ok(adapter) => {
                debug!(adapter = id.0, kind = %source.kind, "Created player adapter");
                adapter
            }
            Err(e) => {
                warn!("Could not create {} backend for {}: {e}", source.kind, source.url);
                Box::new(DetachedAdapter::new(id, source.kind))
            }
        }
    }
}

/// State every adapter carries regardless of backend
#[derive(Debug)]
pub(crate) struct AdapterCore {
    pub id: AdapterId,
    pub kind: MediaKind,
    pub readiness: Readiness,
    pub last_time: f64,
}

impl AdapterCore {
    pub fn new(id: AdapterId, kind: MediaKind) -> Self {
        Self {
            id,
            kind,
            readiness: Readiness::NotReady,
            last_time: 0.0,
        }
    }

    /// Commands are only forwarded to a ready backend
    pub fn accepts(&self, command: &str) -> bool {
        match self.readiness {
            Readiness::Ready => true,
            Readiness::NotReady => {
                debug!(adapter = self.id.0, "Ignoring {command} before ready");
                false
            }
            Readiness::TornDown => {
                debug!(adapter = self.id.0, "Ignoring {command} after teardown");
                false
            }
        }
    }

    /// Ready fires once per instance
    pub fn mark_ready(&mut self) -> Option<AdapterEvent> {
        if self.readiness != Readiness::NotReady {
            return None;
        }
        self.readiness = Readiness::Ready;
        Some(AdapterEvent::Ready)
    }

    pub fn is_torn_down(&self) -> bool {
        self.readiness == Readiness::TornDown
    }

    /// Backends may report 0 right after a command; keep the last real position
    pub fn stable_time(&self, raw: f64) -> f64 {
        stable_time(raw, self.last_time)
    }

    pub fn report(&self, command: &str, result: Result<(), BackendError>) {
        if let Err(e) = result {
            warn!(adapter = self.id.0, kind = %self.kind, "{command} failed: {e}");
        }
    }
}

pub(crate) fn stable_time(raw: f64, last_known: f64) -> f64 {
    if !raw.is_finite() || raw < 0.0 {
        return last_known.max(0.0);
    }
    if raw == 0.0 && last_known > 0.0 {
        last_known
    } else {
        raw
    }
}
