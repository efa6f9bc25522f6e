use serde_json::json;

use super::{ControlCommand, FrameAdapter, FramePayload, FrameProtocol, SignalKind};
use crate::media::{MediaKind, OBRUT_HOSTS};

/// Obrut-family embeds: structured `{api: ...}` commands, `time` positions
pub struct ObrutProtocol;

pub type ObrutAdapter = FrameAdapter<ObrutProtocol>;

impl FrameProtocol for ObrutProtocol {
    const KIND: MediaKind = MediaKind::ObrutEmbed;

    const TRUSTED_ORIGINS: &'static [&'static str] = OBRUT_HOSTS;

    const EVENTS: &'static [(&'static str, SignalKind)] = &[
        ("ready", SignalKind::Ready),
        ("inited", SignalKind::Ready),
        ("play", SignalKind::Play),
        ("resumed", SignalKind::Play),
        ("pause", SignalKind::Pause),
        ("paused", SignalKind::Pause),
        ("time", SignalKind::TimeUpdate),
        ("seek", SignalKind::Seeked),
        ("rewound", SignalKind::Seeked),
        ("forwarded", SignalKind::Seeked),
        ("duration", SignalKind::Duration),
    ];

    const TIME_FIELD: &'static str = "time";

    const SUBSCRIBED_EVENTS: &'static [&'static str] = &["ready", "play", "pause", "time", "seek"];

    fn command(command: ControlCommand) -> FramePayload {
        FramePayload::Json(match command {
            ControlCommand::Play => json!({ "api": "play" }),
            ControlCommand::Pause => json!({ "api": "pause" }),
            ControlCommand::SeekTo(time) => json!({ "api": "seek", "time": time }),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use parking_lot::Mutex;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AdapterConfig,
        player::{
            frame::tests::{frame, FakeWindow, Posted},
            AdapterEvent, AdapterId, AdapterTimer, BackendEvent, BackendSink, PlayerAdapter,
            Readiness,
        },
    };

    type Events = mpsc::UnboundedReceiver<(AdapterId, BackendEvent)>;

    fn adapter() -> (ObrutAdapter, Arc<Mutex<Posted>>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        let posted = Arc::new(Mutex::new(Posted::default()));
        let adapter = ObrutAdapter::new(
            AdapterId(5),
            Box::new(FakeWindow(posted.clone())),
            &BackendSink::new(AdapterId(5), tx),
            &AdapterConfig::default(),
        );
        (adapter, posted, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn handshake_waits_for_grace_period() {
        let (mut adapter, posted, mut rx) = adapter();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        let (_, event) = rx.recv().await.unwrap();
        assert_eq!(event, BackendEvent::Timer(AdapterTimer::Handshake));
        assert_eq!(adapter.handle_backend_event(event), None);

        let posted = posted.lock();
        assert_eq!(posted.messages.len(), ObrutProtocol::SUBSCRIBED_EVENTS.len());
        let FramePayload::Text(first) = &posted.messages[0] else {
            panic!("handshake is sent as a string");
        };
        let first: Value = serde_json::from_str(first).unwrap();
        assert_eq!(first, json!({"method": "addEventListener", "value": "ready"}));
    }

    #[tokio::test]
    async fn translates_obrut_vocabulary() {
        let (mut adapter, posted, _rx) = adapter();
        let origin = "https://api.obrut.show";

        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "inited"}))),
            Some(AdapterEvent::Ready)
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "resumed", "time": 3}))),
            Some(AdapterEvent::Play)
        );
        // Sub-threshold time reports are not progress
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "time", "time": 3.6}))),
            None
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "time", "time": 60}))),
            Some(AdapterEvent::Progress(60.0))
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "rewound", "time": 20}))),
            Some(AdapterEvent::Progress(20.0))
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "duration", "duration": 5400}))),
            None
        );

        adapter.seek_to(90.0);
        adapter.pause();
        let posted = posted.lock();
        assert_eq!(
            posted.messages,
            vec![
                FramePayload::Json(json!({"api": "seek", "time": 90.0})),
                FramePayload::Json(json!({"api": "pause"})),
            ]
        );
    }

    #[tokio::test]
    async fn untrusted_origins_are_ignored() {
        let (mut adapter, _posted, _rx) = adapter();
        assert_eq!(
            adapter.handle_backend_event(frame("https://cdnmovies.net", json!({"event": "ready"}))),
            None
        );
        assert_eq!(adapter.readiness(), Readiness::NotReady);
    }

    #[tokio::test]
    async fn teardown_closes_frame_and_cancels_handshake() {
        let (mut adapter, posted, mut rx) = adapter();
        adapter.teardown();
        assert!(posted.lock().closed);
        assert_eq!(adapter.readiness(), Readiness::TornDown);
        // The aborted timer drops the last sender without firing
        assert!(rx.recv().await.is_none());
        assert!(posted.lock().messages.is_empty());
    }
}
