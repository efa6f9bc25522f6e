//! Simulated playback backends driven by the tokio clock.
//!
//! Used by the `tandem` binary and by tests in place of a real player. The
//! simulated backends raise the same events a real element or embedded SDK
//! would, including for commands issued programmatically.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    task::AbortHandle,
    time::{interval_at, sleep, Instant, MissedTickBehavior},
};
use tracing::debug;

use crate::{
    error::BackendError,
    player::{
        AdapterId, BackendEvent, BackendHost, BackendSink, EmbeddedEvent, EmbeddedPlayer,
        FrameWindow, MediaElement, MediaEvent,
    },
};

const DEFAULT_LOAD_DELAY: Duration = Duration::from_millis(200);
const TIME_UPDATE_INTERVAL: Duration = Duration::from_millis(250);

const STATE_PLAYING: i32 = 1;
const STATE_PAUSED: i32 = 2;

/// Playback position that advances with the tokio clock while playing
#[derive(Debug, Clone, Default)]
struct Clock {
    base: f64,
    started: Option<Instant>,
}

impl Clock {
    fn position(&self) -> f64 {
        match self.started {
            Some(at) => self.base + at.elapsed().as_secs_f64(),
            None => self.base,
        }
    }

    fn is_playing(&self) -> bool {
        self.started.is_some()
    }

    /// Returns whether the state changed
    fn play(&mut self) -> bool {
        if self.started.is_some() {
            return false;
        }
        self.started = Some(Instant::now());
        true
    }

    fn pause(&mut self) -> bool {
        if self.started.is_none() {
            return false;
        }
        self.base = self.position();
        self.started = None;
        true
    }

    fn seek(&mut self, seconds: f64) {
        self.base = seconds.max(0.0);
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Media,
    Embedded,
}

/// The backend currently on screen
struct Screen {
    family: Family,
    sink: BackendSink,
    clock: Arc<Mutex<Clock>>,
}

impl Screen {
    fn announce_play(&self) {
        self.sink.emit(match self.family {
            Family::Media => BackendEvent::Media(MediaEvent::Play),
            Family::Embedded => BackendEvent::Embedded(EmbeddedEvent::StateChange(STATE_PLAYING)),
        });
    }

    fn announce_pause(&self) {
        self.sink.emit(match self.family {
            Family::Media => BackendEvent::Media(MediaEvent::Pause),
            Family::Embedded => BackendEvent::Embedded(EmbeddedEvent::StateChange(STATE_PAUSED)),
        });
    }

    fn announce_seek(&self, seconds: f64) {
        // Embedded players only reveal seeks through progress polling
        if self.family == Family::Media {
            self.sink.emit(BackendEvent::Media(MediaEvent::Seeked(seconds)));
        }
    }
}

type ScreenSlot = Arc<Mutex<Option<Screen>>>;

/// [`BackendHost`] that builds simulated backends. Only the most recently
/// created backend is considered on screen and reachable from
/// [`HeadlessControls`].
#[derive(Clone)]
pub struct HeadlessHost {
    screen: ScreenSlot,
    load_delay: Duration,
}

impl Default for HeadlessHost {
    fn default() -> Self {
        Self::new(DEFAULT_LOAD_DELAY)
    }
}

impl HeadlessHost {
    /// `load_delay` is how long a backend takes to report it can play
    pub fn new(load_delay: Duration) -> Self {
        Self {
            screen: Arc::new(Mutex::new(None)),
            load_delay,
        }
    }

    /// Handle acting as the local viewer
    pub fn controls(&self) -> HeadlessControls {
        HeadlessControls {
            screen: Arc::clone(&self.screen),
        }
    }

    fn mount(&self, family: Family, sink: BackendSink) -> Simulated {
        let clock = Arc::new(Mutex::new(Clock::default()));
        *self.screen.lock() = Some(Screen {
            family,
            sink: sink.clone(),
            clock: Arc::clone(&clock),
        });

        let ready = match family {
            Family::Media => BackendEvent::Media(MediaEvent::CanPlay),
            Family::Embedded => BackendEvent::Embedded(EmbeddedEvent::Ready),
        };
        let loader = {
            let sink = sink.clone();
            let delay = self.load_delay;
            tokio::spawn(async move {
                sleep(delay).await;
                sink.emit(ready);
            })
        };

        let mut tasks = vec![loader.abort_handle()];
        if family == Family::Media {
            tasks.push(spawn_time_updates(sink.clone(), Arc::clone(&clock)));
        }

        Simulated {
            screen: Arc::clone(&self.screen),
            instance: sink.instance(),
            family,
            sink,
            clock,
            tasks,
        }
    }
}

impl BackendHost for HeadlessHost {
    fn media_element(
        &self,
        url: &str,
        events: BackendSink,
    ) -> Result<Box<dyn MediaElement>, BackendError> {
        debug!(adapter = events.instance().0, "Loading {url} headless");
        Ok(Box::new(self.mount(Family::Media, events)))
    }

    fn embedded_player(
        &self,
        video_id: &str,
        events: BackendSink,
    ) -> Result<Box<dyn EmbeddedPlayer>, BackendError> {
        debug!(adapter = events.instance().0, "Embedding video {video_id} headless");
        Ok(Box::new(self.mount(Family::Embedded, events)))
    }

    fn frame(&self, _url: &str, _events: BackendSink) -> Result<Box<dyn FrameWindow>, BackendError> {
        Err(BackendError::Unsupported("cross-frame embeds need a browser"))
    }
}

/// Media elements fire `timeupdate` on their own while playing
fn spawn_time_updates(sink: BackendSink, clock: Arc<Mutex<Clock>>) -> AbortHandle {
    let handle = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + TIME_UPDATE_INTERVAL, TIME_UPDATE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let now = {
                let clock = clock.lock();
                clock.is_playing().then(|| clock.position())
            };
            if let Some(position) = now {
                if !sink.emit(BackendEvent::Media(MediaEvent::TimeUpdate(position))) {
                    break;
                }
            }
        }
    });
    handle.abort_handle()
}

/// One simulated backend instance
struct Simulated {
    screen: ScreenSlot,
    instance: AdapterId,
    family: Family,
    sink: BackendSink,
    clock: Arc<Mutex<Clock>>,
    tasks: Vec<AbortHandle>,
}

impl Simulated {
    fn screen(&self) -> Screen {
        Screen {
            family: self.family,
            sink: self.sink.clone(),
            clock: Arc::clone(&self.clock),
        }
    }

    fn play(&mut self) {
        if self.clock.lock().play() {
            self.screen().announce_play();
        }
    }

    fn pause(&mut self) {
        if self.clock.lock().pause() {
            self.screen().announce_pause();
        }
    }

    fn seek(&mut self, seconds: f64) {
        self.clock.lock().seek(seconds);
        self.screen().announce_seek(seconds.max(0.0));
    }

    fn unmount(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let mut screen = self.screen.lock();
        if screen
            .as_ref()
            .is_some_and(|s| s.sink.instance() == self.instance)
        {
            *screen = None;
        }
    }
}

impl Drop for Simulated {
    fn drop(&mut self) {
        self.unmount();
    }
}

impl MediaElement for Simulated {
    fn play(&mut self) -> Result<(), BackendError> {
        Simulated::play(self);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), BackendError> {
        Simulated::pause(self);
        Ok(())
    }

    fn set_current_time(&mut self, seconds: f64) -> Result<(), BackendError> {
        self.seek(seconds);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.clock.lock().position()
    }

    fn release(&mut self) {
        self.unmount();
    }
}

impl EmbeddedPlayer for Simulated {
    fn play_video(&mut self) -> Result<(), BackendError> {
        Simulated::play(self);
        Ok(())
    }

    fn pause_video(&mut self) -> Result<(), BackendError> {
        Simulated::pause(self);
        Ok(())
    }

    fn seek_to(&mut self, seconds: f64, _allow_seek_ahead: bool) -> Result<(), BackendError> {
        self.seek(seconds);
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.clock.lock().position()
    }

    fn destroy(&mut self) {
        self.unmount();
    }
}

/// Viewer-side controls for whatever is currently on screen
#[derive(Clone)]
pub struct HeadlessControls {
    screen: ScreenSlot,
}

impl HeadlessControls {
    fn with_screen<F: FnOnce(&Screen)>(&self, f: F) -> Result<(), BackendError> {
        match self.screen.lock().as_ref() {
            Some(screen) => {
                f(screen);
                Ok(())
            }
            None => Err(BackendError::Unavailable("nothing is loaded".into())),
        }
    }

    pub fn user_play(&self) -> Result<(), BackendError> {
        self.with_screen(|screen| {
            if screen.clock.lock().play() {
                screen.announce_play();
            }
        })
    }

    pub fn user_pause(&self) -> Result<(), BackendError> {
        self.with_screen(|screen| {
            if screen.clock.lock().pause() {
                screen.announce_pause();
            }
        })
    }

    pub fn user_seek(&self, seconds: f64) -> Result<(), BackendError> {
        self.with_screen(|screen| {
            screen.clock.lock().seek(seconds);
            screen.announce_seek(seconds.max(0.0));
        })
    }

    /// Position and play state of the loaded backend
    pub fn position(&self) -> Option<(f64, bool)> {
        self.screen.lock().as_ref().map(|screen| {
            let clock = screen.clock.lock();
            (clock.position(), clock.is_playing())
        })
    }
}
