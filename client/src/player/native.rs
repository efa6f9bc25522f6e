use tracing::{trace, warn};

use super::{
    AdapterCore, AdapterEvent, AdapterId, BackendEvent, MediaElement, MediaEvent, PlayerAdapter,
    Readiness,
};
use crate::media::MediaKind;

/// Drives a native media element through its direct API
pub struct NativeAdapter {
    core: AdapterCore,
    element: Box<dyn MediaElement>,
}

impl NativeAdapter {
    pub fn new(id: AdapterId, element: Box<dyn MediaElement>) -> Self {
        Self {
            core: AdapterCore::new(id, MediaKind::NativeFile),
            element,
        }
    }
}

impl PlayerAdapter for NativeAdapter {
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
            // Autoplay policies may refuse programmatic play
            let result = self.element.play();
            self.core.report("play", result);
        }
    }

    fn pause(&mut self) {
        if self.core.accepts("pause") {
            let result = self.element.pause();
            self.core.report("pause", result);
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        if self.core.accepts("seek") {
            let result = self.element.set_current_time(seconds);
            self.core.report("seek", result);
            self.core.last_time = seconds;
        }
    }

    fn current_time(&self) -> f64 {
        self.core.stable_time(self.element.current_time())
    }

    fn handle_backend_event(&mut self, event: BackendEvent) -> Option<AdapterEvent> {
        if self.core.is_torn_down() {
            return None;
        }
        let BackendEvent::Media(event) = event else {
            trace!(adapter = self.core.id.0, "Ignoring foreign backend event");
            return None;
        };
        match event {
            MediaEvent::CanPlay => self.core.mark_ready(),
            MediaEvent::Play => Some(AdapterEvent::Play),
            MediaEvent::Pause => Some(AdapterEvent::Pause),
            MediaEvent::TimeUpdate(t) | MediaEvent::Seeked(t) => {
                self.core.last_time = t;
                Some(AdapterEvent::Progress(t))
            }
            MediaEvent::Error(message) => {
                warn!(adapter = self.core.id.0, "Media element error: {message}");
                None
            }
        }
    }

    fn teardown(&mut self) {
        if self.core.is_torn_down() {
            return;
        }
        self.core.readiness = Readiness::TornDown;
        self.element.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;
    use crate::error::BackendError;

    #[derive(Default)]
    struct Calls {
        log: Vec<String>,
        time: f64,
        refuse_play: bool,
    }

    struct FakeElement(Arc<Mutex<Calls>>);

    impl MediaElement for FakeElement {
        fn play(&mut self) -> Result<(), BackendError> {
            let mut calls = self.0.lock();
            calls.log.push("play".into());
            if calls.refuse_play {
                return Err(BackendError::Rejected("autoplay blocked".into()));
            }
            Ok(())
        }

        fn pause(&mut self) -> Result<(), BackendError> {
            self.0.lock().log.push("pause".into());
            Ok(())
        }

        fn set_current_time(&mut self, seconds: f64) -> Result<(), BackendError> {
            let mut calls = self.0.lock();
            calls.log.push(format!("seek {seconds}"));
            calls.time = seconds;
            Ok(())
        }

        fn current_time(&self) -> f64 {
            self.0.lock().time
        }

        fn release(&mut self) {
            self.0.lock().log.push("release".into());
        }
    }

    fn adapter() -> (NativeAdapter, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let adapter = NativeAdapter::new(AdapterId(3), Box::new(FakeElement(calls.clone())));
        (adapter, calls)
    }

    #[test]
    fn commands_before_can_play_are_dropped() {
        let (mut adapter, calls) = adapter();
        adapter.play();
        adapter.seek_to(10.0);
        assert!(calls.lock().log.is_empty());

        assert_eq!(
            adapter.handle_backend_event(BackendEvent::Media(MediaEvent::CanPlay)),
            Some(AdapterEvent::Ready)
        );
        adapter.seek_to(10.0);
        adapter.play();
        assert_eq!(calls.lock().log, vec!["seek 10", "play"]);
    }

    #[test]
    fn rejected_play_does_not_panic() {
        let (mut adapter, calls) = adapter();
        calls.lock().refuse_play = true;
        adapter.handle_backend_event(BackendEvent::Media(MediaEvent::CanPlay));
        adapter.play();
        assert_eq!(adapter.readiness(), Readiness::Ready);
    }

    #[test]
    fn teardown_releases_once_and_silences_events() {
        let (mut adapter, calls) = adapter();
        adapter.handle_backend_event(BackendEvent::Media(MediaEvent::CanPlay));
        adapter.teardown();
        adapter.teardown();
        adapter.pause();
        assert_eq!(calls.lock().log, vec!["release"]);
        assert_eq!(
            adapter.handle_backend_event(BackendEvent::Media(MediaEvent::Play)),
            None
        );
    }

    #[test]
    fn time_updates_become_progress() {
        let (mut adapter, _) = adapter();
        assert_eq!(
            adapter.handle_backend_event(BackendEvent::Media(MediaEvent::TimeUpdate(4.5))),
            Some(AdapterEvent::Progress(4.5))
        );
        // Element still reports 0 but a position is known
        assert_eq!(adapter.current_time(), 4.5);
    }
}
