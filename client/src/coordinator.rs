//! Reconciliation between local player events and remote sync events.
//!
//! Remote commands are applied under an echo-suppression window so the
//! adapter's own reaction to them is not re-broadcast. State that arrives
//! before the adapter is ready waits in a single pending slot; newer state
//! replaces older.

use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::{
    config::SyncConfig,
    error::TransportError,
    media::MediaSource,
    player::{AdapterEvent, AdapterFactory, AdapterId, BackendEvent, PlayerAdapter, Readiness},
    protocol::{clamp_time, ClientMessage, PlaybackState, SyncEvent},
    transport::Transport,
};

/// Where outbound sync messages go
pub trait Outbox: Send {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError>;
}

impl Outbox for Transport {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        Transport::send(self, &message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressClass {
    /// The user jumped to another position
    Seek,
    /// Ordinary forward playback
    Drift,
}

/// Decide whether a position change from `prev` to `cur` is a seek.
///
/// Changes within `tolerance` are drift, as are forward moves of at most
/// `max_forward_delta`. Anything else, in either direction, is a seek.
pub fn classify_progress(
    prev: f64,
    cur: f64,
    tolerance: f64,
    max_forward_delta: f64,
) -> ProgressClass {
    let delta = cur - prev;
    if !delta.is_finite() || delta.abs() <= tolerance {
        return ProgressClass::Drift;
    }
    if delta > 0.0 && delta <= max_forward_delta {
        return ProgressClass::Drift;
    }
    ProgressClass::Seek
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Toggle {
    Play,
    Pause,
}

pub struct SyncCoordinator {
    config: SyncConfig,
    factory: Box<dyn AdapterFactory>,
    outbox: Box<dyn Outbox>,
    adapter: Option<Box<dyn PlayerAdapter>>,
    source: Option<MediaSource>,
    title: Option<String>,
    next_adapter_id: u64,
    suppress_until: Option<Instant>,
    last_known_time: f64,
    pending: Option<PlaybackState>,
    is_playing: bool,
    last_toggle: Option<(Toggle, Instant)>,
}

impl SyncCoordinator {
    pub fn new(
        config: SyncConfig,
        factory: Box<dyn AdapterFactory>,
        outbox: Box<dyn Outbox>,
    ) -> Self {
        Self {
            config,
            factory,
            outbox,
            adapter: None,
            source: None,
            title: None,
            next_adapter_id: 0,
            suppress_until: None,
            last_known_time: 0.0,
            pending: None,
            is_playing: false,
            last_toggle: None,
        }
    }

    /// Apply one event received from the room
    pub fn handle_remote(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Play { at } => self.apply_or_defer(PlaybackState::new(at, true)),
            SyncEvent::Pause { at } => self.apply_or_defer(PlaybackState::new(at, false)),
            SyncEvent::Seek {
                at,
                still_playing: Some(playing),
            } => self.apply_or_defer(PlaybackState::new(at, playing)),
            SyncEvent::Seek {
                at,
                still_playing: None,
            } => self.seek_only(clamp_time(at)),
            SyncEvent::RoomStateSnapshot { state, source } => self.apply_snapshot(state, source),
            SyncEvent::VideoChanged { source, title } => {
                if self.same_source(source.as_ref()) {
                    trace!("Video unchanged");
                    if title.is_some() {
                        self.title = title;
                    }
                    return;
                }
                self.replace_source(source, title);
            }
            SyncEvent::ParticipantListChanged { .. } => {}
        }
    }

    /// Route a raw backend event to the adapter it belongs to
    pub fn handle_backend(&mut self, id: AdapterId, event: BackendEvent) {
        let Some(adapter) = self.adapter.as_mut() else {
            trace!(adapter = id.0, "Dropping backend event: no active adapter");
            return;
        };
        if adapter.id() != id {
            trace!(adapter = id.0, "Dropping backend event for a replaced adapter");
            return;
        }
        if let Some(event) = adapter.handle_backend_event(event) {
            self.handle_local(event);
        }
    }

    /// React to a canonical event raised by the active adapter
    pub fn handle_local(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::Ready => {
                info!("Player ready");
                if let Some(state) = self.pending.take() {
                    debug!(?state, "Applying deferred room state");
                    self.apply_state(state);
                }
            }
            AdapterEvent::Play => self.local_toggle(Toggle::Play),
            AdapterEvent::Pause => self.local_toggle(Toggle::Pause),
            AdapterEvent::Progress(time) => self.local_progress(time),
        }
    }

    /// Switch to a video picked locally and announce it to the room
    pub fn change_source(&mut self, url: &str, title: Option<String>) {
        let source = MediaSource::from_url(url);
        if self.same_source(source.as_ref()) {
            return;
        }
        self.replace_source(source, title);
        self.broadcast(ClientMessage::VideoChange {
            video_url: url.trim().to_string(),
        });
    }

    /// When the current suppression window ends, if one is open
    pub fn suppression_deadline(&self) -> Option<Instant> {
        self.suppress_until
    }

    pub fn release_suppression(&mut self) {
        if self.suppress_until.take().is_some() {
            trace!("Echo suppression released");
        }
    }

    pub fn is_suppressing(&self) -> bool {
        self.suppress_until
            .is_some_and(|deadline| Instant::now() < deadline)
    }

    /// Release the adapter and forget all timing state
    pub fn teardown(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.teardown();
        }
        self.suppress_until = None;
        self.pending = None;
        self.last_toggle = None;
    }

    pub fn source(&self) -> Option<&MediaSource> {
        self.source.as_ref()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn last_known_time(&self) -> f64 {
        self.last_known_time
    }

    pub fn pending_state(&self) -> Option<PlaybackState> {
        self.pending
    }

    pub fn adapter_id(&self) -> Option<AdapterId> {
        self.adapter.as_ref().map(|adapter| adapter.id())
    }

    pub fn adapter_readiness(&self) -> Option<Readiness> {
        self.adapter.as_ref().map(|adapter| adapter.readiness())
    }

    /// Best current position: the adapter's, else the last one observed
    pub fn current_time(&self) -> f64 {
        match self.ready_adapter() {
            Some(adapter) => adapter.current_time(),
            None => self.last_known_time,
        }
    }

    fn ready_adapter(&self) -> Option<&dyn PlayerAdapter> {
        self.adapter
            .as_deref()
            .filter(|adapter| adapter.readiness() == Readiness::Ready)
    }

    fn same_source(&self, source: Option<&MediaSource>) -> bool {
        self.source.as_ref().map(|s| s.url.as_str()) == source.map(|s| s.url.as_str())
    }

    fn apply_snapshot(&mut self, state: PlaybackState, source: Option<MediaSource>) {
        if !self.same_source(source.as_ref()) {
            self.replace_source(source, None);
        }
        if self.source.is_none() {
            debug!("Room has no video; nothing to apply");
            return;
        }
        self.apply_or_defer(state);
    }

    fn apply_or_defer(&mut self, state: PlaybackState) {
        self.begin_suppression();
        if self.ready_adapter().is_some() {
            self.apply_state(state);
        } else {
            if self.pending.is_some() {
                trace!("Replacing deferred room state");
            }
            debug!(?state, "Player not ready; deferring room state");
            self.pending = Some(state);
        }
    }

    fn seek_only(&mut self, at: f64) {
        self.begin_suppression();
        match self.adapter.as_mut().filter(|a| a.readiness() == Readiness::Ready) {
            Some(adapter) => {
                adapter.seek_to(at);
                self.last_known_time = at;
            }
            None => {
                // Keep whatever play flag is already on its way
                let playing = self.pending.map_or(self.is_playing, |p| p.is_playing);
                self.pending = Some(PlaybackState::new(at, playing));
            }
        }
    }

    /// Same state in, same commands out
    fn apply_state(&mut self, state: PlaybackState) {
        self.begin_suppression();
        let Some(adapter) = self.adapter.as_mut() else {
            return;
        };
        adapter.seek_to(state.current_time);
        if state.is_playing {
            adapter.play();
        } else {
            adapter.pause();
        }
        self.is_playing = state.is_playing;
        self.last_known_time = state.current_time;
    }

    /// Open (or extend) the suppression window; a newer command always
    /// supersedes the deadline of an older one
    fn begin_suppression(&mut self) {
        self.suppress_until = Some(Instant::now() + self.config.suppression_window);
    }

    fn replace_source(&mut self, source: Option<MediaSource>, title: Option<String>) {
        if let Some(mut old) = self.adapter.take() {
            debug!(adapter = old.id().0, "Tearing down player for previous video");
            old.teardown();
        }
        self.last_known_time = 0.0;
        self.is_playing = false;
        self.pending = None;
        self.last_toggle = None;
        self.suppress_until = None;
        self.title = title;

        match &source {
            Some(source) => {
                self.next_adapter_id += 1;
                let id = AdapterId(self.next_adapter_id);
                info!(kind = %source.kind, url = %source.url, "Loading video");
                self.adapter = Some(self.factory.create(source, id));
            }
            None => info!("Video cleared"),
        }
        self.source = source;
    }

    fn local_toggle(&mut self, toggle: Toggle) {
        let now = Instant::now();
        let duplicate = self.last_toggle.is_some_and(|(last, at)| {
            last == toggle && now.duration_since(at) < self.config.echo_debounce
        });
        self.last_toggle = Some((toggle, now));
        if duplicate {
            trace!(?toggle, "Coalescing duplicate player event");
            return;
        }

        let playing = toggle == Toggle::Play;
        if self.is_suppressing() {
            trace!(?toggle, "Suppressing echo of remote command");
            self.is_playing = playing;
            return;
        }

        let current_time = self.current_time();
        self.is_playing = playing;
        self.broadcast(match toggle {
            Toggle::Play => ClientMessage::Play { current_time },
            Toggle::Pause => ClientMessage::Pause { current_time },
        });
    }

    fn local_progress(&mut self, time: f64) {
        let time = clamp_time(time);
        let previous = std::mem::replace(&mut self.last_known_time, time);
        if self.is_suppressing() {
            return;
        }
        let class = classify_progress(
            previous,
            time,
            self.config.seek_tolerance_secs,
            self.config.max_forward_delta_secs,
        );
        if class == ProgressClass::Seek {
            debug!(from = previous, to = time, "Local seek detected");
            self.broadcast(ClientMessage::Seek {
                current_time: time,
                is_playing: self.is_playing,
            });
        }
    }

    fn broadcast(&self, message: ClientMessage) {
        if let Err(e) = self.outbox.send(message) {
            warn!("Sync message dropped: {e}");
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}
