use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::time::advance;

use tandem_client::{
    config::SyncConfig,
    coordinator::{Outbox, SyncCoordinator},
    error::TransportError,
    media::{MediaKind, MediaSource},
    player::{
        AdapterEvent, AdapterFactory, AdapterId, BackendEvent, MediaEvent, PlayerAdapter,
        Readiness,
    },
    protocol::{ClientMessage, PlaybackState, SyncEvent},
};

const MOVIE: &str = "https://cdn.example.com/movie.mp4";
const TRAILER: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Seek(f64),
    Play,
    Pause,
    Teardown,
}

type CallLog = Arc<Mutex<Vec<(AdapterId, Call)>>>;

/// Adapter that records what it was told; becomes ready on `CanPlay`
struct RecordingAdapter {
    id: AdapterId,
    kind: MediaKind,
    readiness: Readiness,
    position: f64,
    calls: CallLog,
}

impl RecordingAdapter {
    fn record(&self, call: Call) {
        self.calls.lock().push((self.id, call));
    }
}

impl PlayerAdapter for RecordingAdapter {
    fn id(&self) -> AdapterId {
        self.id
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn readiness(&self) -> Readiness {
        self.readiness
    }

    fn play(&mut self) {
        if self.readiness == Readiness::Ready {
            self.record(Call::Play);
        }
    }

    fn pause(&mut self) {
        if self.readiness == Readiness::Ready {
            self.record(Call::Pause);
        }
    }

    fn seek_to(&mut self, seconds: f64) {
        if self.readiness == Readiness::Ready {
            self.position = seconds;
            self.record(Call::Seek(seconds));
        }
    }

    fn current_time(&self) -> f64 {
        self.position
    }

    fn handle_backend_event(&mut self, event: BackendEvent) -> Option<AdapterEvent> {
        match event {
            BackendEvent::Media(MediaEvent::CanPlay) if self.readiness == Readiness::NotReady => {
                self.readiness = Readiness::Ready;
                Some(AdapterEvent::Ready)
            }
            BackendEvent::Media(MediaEvent::TimeUpdate(t)) => {
                self.position = t;
                Some(AdapterEvent::Progress(t))
            }
            _ => None,
        }
    }

    fn teardown(&mut self) {
        if self.readiness != Readiness::TornDown {
            self.readiness = Readiness::TornDown;
            self.record(Call::Teardown);
        }
    }
}

struct RecordingFactory {
    calls: CallLog,
    created: Arc<Mutex<Vec<(AdapterId, MediaKind)>>>,
}

impl AdapterFactory for RecordingFactory {
    fn create(&mut self, source: &MediaSource, id: AdapterId) -> Box<dyn PlayerAdapter> {
        self.created.lock().push((id, source.kind));
        Box::new(RecordingAdapter {
            id,
            kind: source.kind,
            readiness: Readiness::NotReady,
            position: 0.0,
            calls: Arc::clone(&self.calls),
        })
    }
}

struct RecordingOutbox(Arc<Mutex<Vec<ClientMessage>>>);

impl Outbox for RecordingOutbox {
    fn send(&self, message: ClientMessage) -> Result<(), TransportError> {
        self.0.lock().push(message);
        Ok(())
    }
}

struct Harness {
    coordinator: SyncCoordinator,
    calls: CallLog,
    created: Arc<Mutex<Vec<(AdapterId, MediaKind)>>>,
    sent: Arc<Mutex<Vec<ClientMessage>>>,
}

impl Harness {
    fn new() -> Self {
        let calls = CallLog::default();
        let created = Arc::new(Mutex::new(Vec::new()));
        let sent = Arc::new(Mutex::new(Vec::new()));
        let coordinator = SyncCoordinator::new(
            SyncConfig::default(),
            Box::new(RecordingFactory {
                calls: Arc::clone(&calls),
                created: Arc::clone(&created),
            }),
            Box::new(RecordingOutbox(Arc::clone(&sent))),
        );
        Self {
            coordinator,
            calls,
            created,
            sent,
        }
    }

    /// Room showing `url`, paused at 0, with a ready player and no
    /// suppression left over
    async fn ready_with(url: &str) -> Self {
        let mut harness = Self::new();
        harness.snapshot(url, 0.0, false);
        harness.make_ready();
        advance(Duration::from_secs(2)).await;
        harness.calls.lock().clear();
        harness
    }

    fn snapshot(&mut self, url: &str, at: f64, playing: bool) {
        self.coordinator.handle_remote(SyncEvent::RoomStateSnapshot {
            state: PlaybackState::new(at, playing),
            source: MediaSource::from_url(url),
        });
    }

    fn make_ready(&mut self) {
        let id = self.coordinator.adapter_id().expect("no adapter");
        self.coordinator
            .handle_backend(id, BackendEvent::Media(MediaEvent::CanPlay));
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().clone()
    }
}

#[tokio::test(start_paused = true)]
async fn remote_seek_and_play_is_not_echoed() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.handle_remote(SyncEvent::Seek {
        at: 125.4,
        still_playing: Some(true),
    });
    assert_eq!(h.calls(), vec![Call::Seek(125.4), Call::Play]);
    assert!(h.coordinator.is_suppressing());

    // The player reacts to the commands it was just given
    h.coordinator.handle_local(AdapterEvent::Play);
    advance(Duration::from_millis(400)).await;
    h.coordinator.handle_local(AdapterEvent::Progress(125.4));
    advance(Duration::from_millis(500)).await;
    h.coordinator.handle_local(AdapterEvent::Progress(126.3));
    assert!(h.sent().is_empty());
    assert!(h.coordinator.is_playing());

    advance(Duration::from_millis(200)).await;
    assert!(!h.coordinator.is_suppressing());
    h.coordinator.handle_local(AdapterEvent::Pause);
    assert_eq!(h.sent(), vec![ClientMessage::Pause { current_time: 125.4 }]);
}

#[tokio::test(start_paused = true)]
async fn newer_remote_command_extends_suppression() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.handle_remote(SyncEvent::Play { at: 10.0 });
    let first = h.coordinator.suppression_deadline().unwrap();
    advance(Duration::from_millis(800)).await;
    h.coordinator.handle_remote(SyncEvent::Pause { at: 10.8 });
    let second = h.coordinator.suppression_deadline().unwrap();
    assert!(second > first);

    advance(Duration::from_millis(500)).await;
    h.coordinator.handle_local(AdapterEvent::Pause);
    assert!(h.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn outbound_count_matches_unsuppressed_toggles() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.handle_local(AdapterEvent::Play);
    advance(Duration::from_millis(400)).await;
    h.coordinator.handle_local(AdapterEvent::Pause);
    advance(Duration::from_millis(400)).await;
    h.coordinator.handle_local(AdapterEvent::Play);

    assert_eq!(
        h.sent(),
        vec![
            ClientMessage::Play { current_time: 0.0 },
            ClientMessage::Pause { current_time: 0.0 },
            ClientMessage::Play { current_time: 0.0 },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn near_duplicate_toggles_coalesce() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.handle_local(AdapterEvent::Play);
    advance(Duration::from_millis(150)).await;
    h.coordinator.handle_local(AdapterEvent::Play);

    assert_eq!(h.sent(), vec![ClientMessage::Play { current_time: 0.0 }]);
}

#[tokio::test(start_paused = true)]
async fn latest_snapshot_is_applied_once_on_ready() {
    let mut h = Harness::new();
    h.snapshot(MOVIE, 5.0, false);
    h.snapshot(MOVIE, 30.0, true);
    assert!(h.calls().is_empty());
    assert_eq!(
        h.coordinator.pending_state(),
        Some(PlaybackState::new(30.0, true))
    );

    h.make_ready();
    assert_eq!(h.calls(), vec![Call::Seek(30.0), Call::Play]);
    assert_eq!(h.coordinator.pending_state(), None);

    h.coordinator.handle_local(AdapterEvent::Ready);
    assert_eq!(h.calls().len(), 2);
    assert_eq!(h.created.lock().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn bare_seek_before_ready_keeps_pending_play_flag() {
    let mut h = Harness::new();
    h.snapshot(MOVIE, 5.0, true);
    h.coordinator.handle_remote(SyncEvent::Seek {
        at: 42.0,
        still_playing: None,
    });
    assert_eq!(
        h.coordinator.pending_state(),
        Some(PlaybackState::new(42.0, true))
    );
}

#[tokio::test(start_paused = true)]
async fn same_state_twice_issues_same_commands() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.handle_remote(SyncEvent::Play { at: 20.0 });
    let once = h.calls();
    h.calls.lock().clear();
    h.coordinator.handle_remote(SyncEvent::Play { at: 20.0 });

    assert_eq!(once, vec![Call::Seek(20.0), Call::Play]);
    assert_eq!(h.calls(), once);
}

#[tokio::test(start_paused = true)]
async fn switching_source_while_playing_starts_fresh() {
    let mut h = Harness::ready_with(MOVIE).await;
    h.coordinator.handle_remote(SyncEvent::Play { at: 50.0 });
    let old = h.coordinator.adapter_id().unwrap();
    h.calls.lock().clear();

    h.coordinator.handle_remote(SyncEvent::VideoChanged {
        source: MediaSource::from_url(TRAILER),
        title: Some("Trailer".into()),
    });

    assert_eq!(*h.calls.lock(), vec![(old, Call::Teardown)]);
    assert_eq!(h.coordinator.last_known_time(), 0.0);
    assert!(!h.coordinator.is_playing());
    assert_eq!(h.coordinator.pending_state(), None);
    assert_eq!(h.coordinator.adapter_readiness(), Some(Readiness::NotReady));
    assert_eq!(h.coordinator.title(), Some("Trailer"));

    let kinds: Vec<_> = h.created.lock().iter().map(|(_, kind)| *kind).collect();
    assert_eq!(kinds, vec![MediaKind::NativeFile, MediaKind::YouTube]);

    // Late events from the old player go nowhere
    h.coordinator
        .handle_backend(old, BackendEvent::Media(MediaEvent::CanPlay));
    assert_eq!(h.coordinator.adapter_readiness(), Some(Readiness::NotReady));

    // Commands wait for the new player
    h.coordinator.handle_remote(SyncEvent::Play { at: 3.0 });
    assert_eq!(h.calls().len(), 1);
    h.make_ready();
    let new = h.coordinator.adapter_id().unwrap();
    assert_ne!(new, old);
    assert_eq!(
        h.calls.lock()[1..].to_vec(),
        vec![(new, Call::Seek(3.0)), (new, Call::Play)]
    );
}

#[tokio::test(start_paused = true)]
async fn same_video_again_keeps_the_player() {
    let mut h = Harness::ready_with(MOVIE).await;
    let id = h.coordinator.adapter_id();

    h.coordinator.handle_remote(SyncEvent::VideoChanged {
        source: MediaSource::from_url(MOVIE),
        title: None,
    });
    assert_eq!(h.coordinator.adapter_id(), id);
    assert!(h.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn local_jumps_broadcast_seeks() {
    let mut h = Harness::ready_with(MOVIE).await;
    h.coordinator.handle_local(AdapterEvent::Play);
    h.sent.lock().clear();

    let id = h.coordinator.adapter_id().unwrap();
    for t in [0.5, 1.2, 2.9, 40.0, 40.3, 12.0] {
        h.coordinator
            .handle_backend(id, BackendEvent::Media(MediaEvent::TimeUpdate(t)));
    }

    assert_eq!(
        h.sent(),
        vec![
            ClientMessage::Seek {
                current_time: 40.0,
                is_playing: true
            },
            ClientMessage::Seek {
                current_time: 12.0,
                is_playing: true
            },
        ]
    );
    assert_eq!(h.coordinator.last_known_time(), 12.0);
}

#[tokio::test(start_paused = true)]
async fn local_video_change_is_announced_once() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.coordinator.change_source(TRAILER, None);
    h.coordinator.change_source(TRAILER, None);

    assert_eq!(
        h.sent(),
        vec![ClientMessage::VideoChange {
            video_url: TRAILER.into()
        }]
    );
    assert_eq!(h.created.lock().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn empty_snapshot_clears_the_video() {
    let mut h = Harness::ready_with(MOVIE).await;

    h.snapshot("", 0.0, false);
    assert_eq!(h.coordinator.source(), None);
    assert_eq!(h.coordinator.adapter_id(), None);
    assert_eq!(h.calls(), vec![Call::Teardown]);
}
