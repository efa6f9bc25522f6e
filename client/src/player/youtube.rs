use std::time::Duration;

use tracing::{trace, warn};

use super::{
    AdapterCore, AdapterEvent, AdapterId, AdapterTimer, BackendEvent, BackendSink, EmbeddedEvent,
    EmbeddedPlayer, PlayerAdapter, Readiness, TimerGuard,
};
use crate::media::MediaKind;

/// IFrame API player states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Unstarted,
    Ended,
    Playing,
    Paused,
    Buffering,
    Cued,
}

impl PlayerState {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -1 => Self::Unstarted,
            0 => Self::Ended,
            1 => Self::Playing,
            2 => Self::Paused,
            3 => Self::Buffering,
            5 => Self::Cued,
            _ => return None,
        })
    }
}

/// Drives an embedded player through its SDK. The SDK has no time-update
/// callback, so progress is polled once ready.
pub struct YouTubeAdapter {
    core: AdapterCore,
    player: Box<dyn EmbeddedPlayer>,
    sink: BackendSink,
    poll_interval: Duration,
    poll: Option<TimerGuard>,
}

impl YouTubeAdapter {
    pub fn new(
        id: AdapterId,
        player: Box<dyn EmbeddedPlayer>,
        sink: BackendSink,
        poll_interval: Duration,
    ) -> Self {
        Self {
            core: AdapterCore::new(id, MediaKind::YouTube),
            player,
            sink,
            poll_interval,
            poll: None,
        }
    }

    fn on_embedded(&mut self, event: EmbeddedEvent) -> Option<AdapterEvent> {
        match event {
            EmbeddedEvent::Ready => {
                let ready = self.core.mark_ready();
                if ready.is_some() {
                    self.poll = Some(self.sink.every(self.poll_interval, AdapterTimer::ProgressPoll));
                }
                ready
            }
            EmbeddedEvent::StateChange(code) => match PlayerState::from_code(code) {
                Some(PlayerState::Playing) => Some(AdapterEvent::Play),
                Some(PlayerState::Paused) => Some(AdapterEvent::Pause),
                Some(state) => {
                    trace!(adapter = self.core.id.0, ?state, "Player state");
                    None
                }
                None => {
                    trace!(adapter = self.core.id.0, code, "Unknown player state");
                    None
                }
            },
            EmbeddedEvent::Error(code) => {
                warn!(adapter = self.core.id.0, code, "Embedded player error");
                None
            }
        }
    }

    fn poll_progress(&mut self) -> Option<AdapterEvent> {
        if self.core.readiness != Readiness::Ready {
            return None;
        }
        let time = self.current_time();
        self.core.last_time = time;
        Some(AdapterEvent::Progress(time))
    }
}

impl PlayerAdapter for YouTubeAdapter {
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
            let result = self.player.play_video();
            self.core.report("play", result);
        }
    }

    fn pause(&mut self) {
        if self.core.accepts("pause") {
            let result = self.player.pause_video();
            self.core.report("pause", result);
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        if self.core.accepts("seek") {
            let result = self.player.seek_to(seconds, true);
            self.core.report("seek", result);
            self.core.last_time = seconds;
        }
    }

    fn current_time(&self) -> f64 {
        self.core.stable_time(self.player.current_time())
    }

    fn handle_backend_event(&mut self, event: BackendEvent) -> Option<AdapterEvent> {
        if self.core.is_torn_down() {
            return None;
        }
        match event {
            BackendEvent::Embedded(event) => self.on_embedded(event),
            BackendEvent::Timer(AdapterTimer::ProgressPoll) => self.poll_progress(),
            _ => None,
        }
    }

    fn teardown(&mut self) {
        if self.core.is_torn_down() {
            return;
        }
        self.core.readiness = Readiness::TornDown;
        self.poll = None;
        self.player.destroy();
    }
}
