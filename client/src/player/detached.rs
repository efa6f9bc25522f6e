use tracing::debug;

use super::{AdapterCore, AdapterEvent, AdapterId, BackendEvent, PlayerAdapter, Readiness};
use crate::media::MediaKind;

/// Stand-in for embeds with no known control surface, or whose backend could
/// not be created. It never becomes ready, so it is never commanded.
pub struct DetachedAdapter {
    core: AdapterCore,
}

impl DetachedAdapter {
    pub fn new(id: AdapterId, kind: MediaKind) -> Self {
        debug!(adapter = id.0, %kind, "Video is not controllable; sync disabled for it");
        Self {
            core: AdapterCore::new(id, kind),
        }
    }
}

impl PlayerAdapter for DetachedAdapter {
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
        self.core.accepts("play");
    }

    fn pause(&mut self) {
        self.core.accepts("pause");
    }

    fn seek_to(&mut self, _seconds: f64) {
        self.core.accepts("seek");
    }

    fn current_time(&self) -> f64 {
        0.0
    }

    fn handle_backend_event(&mut self, _event: BackendEvent) -> Option<AdapterEvent> {
        None
    }

    fn teardown(&mut self) {
        self.core.readiness = Readiness::TornDown;
    }
}
