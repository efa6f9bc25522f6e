//! Contracts the hosting environment implements for each backend family,
//! plus the event plumbing backends use to talk back to their adapter.

use std::time::Duration;

use serde_json::Value;
use tokio::{
    sync::mpsc,
    task::AbortHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};

use crate::error::BackendError;

/// Identity of one adapter instance; never reused within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AdapterId(pub u64);

/// Raw, backend-specific notifications routed to the adapter that owns them
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    Media(MediaEvent),
    Embedded(EmbeddedEvent),
    Frame(FrameMessage),
    Timer(AdapterTimer),
}

/// Native media element events
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    CanPlay,
    Play,
    Pause,
    TimeUpdate(f64),
    Seeked(f64),
    Error(String),
}

/// Embedded player SDK callbacks
#[derive(Debug, Clone, PartialEq)]
pub enum EmbeddedEvent {
    Ready,
    /// Raw SDK state code (see [`crate::player::youtube::PlayerState`])
    StateChange(i32),
    Error(i32),
}

/// A cross-frame message as received by the embedding window
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    pub origin: String,
    pub data: FramePayload,
}

/// Frames post either serialized strings or structured objects
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Text(String),
    Json(Value),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterTimer {
    Handshake,
    ProgressPoll,
}

/// Direct control surface of a native media element
pub trait MediaElement: Send {
    fn play(&mut self) -> Result<(), BackendError>;
    fn pause(&mut self) -> Result<(), BackendError>;
    fn set_current_time(&mut self, seconds: f64) -> Result<(), BackendError>;
    fn current_time(&self) -> f64;
    fn release(&mut self);
}

/// Dedicated control API of an embedded third-party player
pub trait EmbeddedPlayer: Send {
    fn play_video(&mut self) -> Result<(), BackendError>;
    fn pause_video(&mut self) -> Result<(), BackendError>;
    fn seek_to(&mut self, seconds: f64, allow_seek_ahead: bool) -> Result<(), BackendError>;
    fn current_time(&self) -> f64;
    fn destroy(&mut self);
}

/// A remote frame reachable only by message passing
pub trait FrameWindow: Send {
    fn post_message(&mut self, payload: FramePayload) -> Result<(), BackendError>;
    fn close(&mut self);
}

/// Creates backend resources. Every backend receives the sink its events
/// must be delivered through.
pub trait BackendHost: Send + Sync {
    fn media_element(
        &self,
        url: &str,
        events: BackendSink,
    ) -> Result<Box<dyn MediaElement>, BackendError>;

    fn embedded_player(
        &self,
        video_id: &str,
        events: BackendSink,
    ) -> Result<Box<dyn EmbeddedPlayer>, BackendError>;

    fn frame(&self, url: &str, events: BackendSink) -> Result<Box<dyn FrameWindow>, BackendError>;
}

pub type BackendEnvelope = (AdapterId, BackendEvent);

/// Event sender bound to one adapter instance
#[derive(Debug, Clone)]
pub struct BackendSink {
    instance: AdapterId,
    tx: mpsc::UnboundedSender<BackendEnvelope>,
}

impl BackendSink {
    pub fn new(instance: AdapterId, tx: mpsc::UnboundedSender<BackendEnvelope>) -> Self {
        Self { instance, tx }
    }

    pub fn instance(&self) -> AdapterId {
        self.instance
    }

    /// Returns false once the session stopped listening
    pub fn emit(&self, event: BackendEvent) -> bool {
        self.tx.send((self.instance, event)).is_ok()
    }

    /// Deliver `timer` once after `delay`
    pub fn schedule(&self, delay: Duration, timer: AdapterTimer) -> TimerGuard {
        let sink = self.clone();
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            sink.emit(BackendEvent::Timer(timer));
        });
        TimerGuard(handle.abort_handle())
    }

    /// Deliver `timer` every `period`, starting one period from now
    pub fn every(&self, period: Duration, timer: AdapterTimer) -> TimerGuard {
        let sink = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !sink.emit(BackendEvent::Timer(timer)) {
                    break;
                }
            }
        });
        TimerGuard(handle.abort_handle())
    }
}

/// Cancels its timer task when dropped
#[derive(Debug)]
pub struct TimerGuard(AbortHandle);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
