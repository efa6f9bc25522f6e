//! Cross-frame adapters: the embedded player lives in a foreign frame and is
//! reachable only through posted messages.

use std::marker::PhantomData;

use serde_json::{json, Value};
use tracing::{debug, trace};
use url::Url;

use super::{
    AdapterCore, AdapterEvent, AdapterId, AdapterTimer, BackendEvent, BackendSink, ControlCommand,
    FrameMessage, FramePayload, FrameWindow, PlayerAdapter, Readiness, TimerGuard,
};
use crate::{config::AdapterConfig, media::host_in, media::MediaKind};

/// Canonical meaning of a backend event name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Ready,
    Play,
    Pause,
    TimeUpdate,
    Seeked,
    Duration,
}

/// Message vocabulary of one embed family
pub trait FrameProtocol: Send + 'static {
    const KIND: MediaKind;

    /// Hostnames allowed to post to us
    const TRUSTED_ORIGINS: &'static [&'static str];

    /// Backend event name to canonical signal
    const EVENTS: &'static [(&'static str, SignalKind)];

    /// Payload field carrying the position in seconds
    const TIME_FIELD: &'static str;

    /// Events requested during the handshake
    const SUBSCRIBED_EVENTS: &'static [&'static str];

    fn command(command: ControlCommand) -> FramePayload;

    fn subscribe(event: &str) -> FramePayload {
        FramePayload::Text(json!({ "method": "addEventListener", "value": event }).to_string())
    }
}

/// A message decoded through a protocol's table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameSignal {
    pub kind: SignalKind,
    pub time: Option<f64>,
}

/// Does `origin` belong to one of `domains`? Unparseable origins never do.
pub fn origin_trusted(origin: &str, domains: &[&str]) -> bool {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(|host| host_in(host, domains)))
        .unwrap_or(false)
}

pub(crate) fn translate<P: FrameProtocol>(payload: &FramePayload) -> Option<FrameSignal> {
    let parsed;
    let message = match payload {
        FramePayload::Json(value) => value,
        FramePayload::Text(text) => {
            parsed = serde_json::from_str::<Value>(text).ok()?;
            &parsed
        }
    };

    let name = message.get("event")?.as_str()?;
    let kind = P::EVENTS
        .iter()
        .find(|(event, _)| *event == name)
        .map(|(_, kind)| *kind)?;

    let field = match kind {
        SignalKind::Duration => "duration",
        _ => P::TIME_FIELD,
    };
    let time = message.get(field).and_then(seconds_of);

    Some(FrameSignal { kind, time })
}

/// Positions arrive as numbers or numeric strings
fn seconds_of(value: &Value) -> Option<f64> {
    let seconds = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (seconds.is_finite() && seconds >= 0.0).then_some(seconds)
}

/// Adapter for any frame protocol `P`
pub struct FrameAdapter<P: FrameProtocol> {
    core: AdapterCore,
    window: Box<dyn FrameWindow>,
    handshake: Option<TimerGuard>,
    time_threshold: f64,
    _protocol: PhantomData<fn() -> P>,
}

impl<P: FrameProtocol> FrameAdapter<P> {
    /// The handshake is delayed: the embedded script may not be listening yet
    pub fn new(
        id: AdapterId,
        window: Box<dyn FrameWindow>,
        sink: &BackendSink,
        config: &AdapterConfig,
    ) -> Self {
        Self {
            core: AdapterCore::new(id, P::KIND),
            window,
            handshake: Some(sink.schedule(config.handshake_delay, AdapterTimer::Handshake)),
            time_threshold: config.frame_time_threshold_secs,
            _protocol: PhantomData,
        }
    }

    fn post(&mut self, payload: FramePayload) {
        let result = self.window.post_message(payload);
        self.core.report("post", result);
    }

    fn send_handshake(&mut self) {
        self.handshake = None;
        debug!(adapter = self.core.id.0, kind = %P::KIND, "Subscribing to frame events");
        for event in P::SUBSCRIBED_EVENTS {
            self.post(P::subscribe(event));
        }
    }

    fn on_message(&mut self, message: FrameMessage) -> Option<AdapterEvent> {
        if !origin_trusted(&message.origin, P::TRUSTED_ORIGINS) {
            trace!(origin = %message.origin, "Dropping message from untrusted origin");
            return None;
        }
        let signal = translate::<P>(&message.data)?;

        match signal.kind {
            SignalKind::Ready => self.core.mark_ready(),
            SignalKind::Play => {
                if let Some(t) = signal.time {
                    self.core.last_time = t;
                }
                Some(AdapterEvent::Play)
            }
            SignalKind::Pause => {
                if let Some(t) = signal.time {
                    self.core.last_time = t;
                }
                Some(AdapterEvent::Pause)
            }
            SignalKind::TimeUpdate => {
                let t = signal.time?;
                // Frames report several times a second; only jumps matter
                if (t - self.core.last_time).abs() > self.time_threshold {
                    self.core.last_time = t;
                    Some(AdapterEvent::Progress(t))
                } else {
                    None
                }
            }
            SignalKind::Seeked => {
                let t = signal.time?;
                self.core.last_time = t;
                Some(AdapterEvent::Progress(t))
            }
            SignalKind::Duration => {
                trace!(adapter = self.core.id.0, duration = ?signal.time, "Frame duration");
                None
            }
        }
    }
}

impl<P: FrameProtocol> PlayerAdapter for FrameAdapter<P> {
    fn id(&self) -> AdapterId {
        self.core.id
    }

    fn kind(&self) -> MediaKind {
        self.core.kind
    }

    fn readiness(&self) -> Readiness {
        self.core.readiness
    }

    fn play(&mut self) {
        if self.core.accepts("play") {
            self.post(P::command(ControlCommand::Play));
        }
    }

    fn pause(&mut self) {
        if self.core.accepts("pause") {
            self.post(P::command(ControlCommand::Pause));
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        if self.core.accepts("seek") {
            self.post(P::command(ControlCommand::SeekTo(seconds)));
            self.core.last_time = seconds;
        }
    }

    /// Frames cannot be queried synchronously; this is the last reported position
    fn current_time(&self) -> f64 {
        self.core.last_time
    }

    fn handle_backend_event(&mut self, event: BackendEvent) -> Option<AdapterEvent> {
        if self.core.is_torn_down() {
            return None;
        }
        match event {
            BackendEvent::Timer(AdapterTimer::Handshake) => {
                self.send_handshake();
                None
            }
            BackendEvent::Frame(message) => self.on_message(message),
            _ => None,
        }
    }

    fn teardown(&mut self) {
        if self.core.is_torn_down() {
            return;
        }
        self.core.readiness = Readiness::TornDown;
        self.handshake = None;
        self.window.close();
    }
}
