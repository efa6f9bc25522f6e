use serde_json::json;

use super::{ControlCommand, FrameAdapter, FramePayload, FrameProtocol, SignalKind};
use crate::media::MediaKind;

/// Player.js embeds: serialized `{method, value}` commands, `seconds` positions
pub struct PlayerJsProtocol;

pub type PlayerJsAdapter = FrameAdapter<PlayerJsProtocol>;

/// Classification hosts plus the obrut.show CDN, which also serves Player.js frames
const TRUSTED: &[&str] = &["short.gy", "cdnmovies.net", "vibix.me", "obrut.show"];

impl FrameProtocol for PlayerJsProtocol {
    const KIND: MediaKind = MediaKind::PlayerJsEmbed;

    const TRUSTED_ORIGINS: &'static [&'static str] = TRUSTED;

    const EVENTS: &'static [(&'static str, SignalKind)] = &[
        ("ready", SignalKind::Ready),
        ("play", SignalKind::Play),
        ("pause", SignalKind::Pause),
        ("timeupdate", SignalKind::TimeUpdate),
        ("seeked", SignalKind::Seeked),
    ];

    const TIME_FIELD: &'static str = "seconds";

    const SUBSCRIBED_EVENTS: &'static [&'static str] =
        &["ready", "play", "pause", "timeupdate", "seeked"];

    fn command(command: ControlCommand) -> FramePayload {
        let message = match command {
            ControlCommand::Play => json!({ "method": "play" }),
            ControlCommand::Pause => json!({ "method": "pause" }),
            ControlCommand::SeekTo(seconds) => json!({ "method": "setCurrentTime", "value": seconds }),
        };
        FramePayload::Text(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        config::AdapterConfig,
        player::{
            frame::tests::{frame, FakeWindow, Posted},
            AdapterEvent, AdapterId, BackendEvent, BackendSink, FrameMessage, PlayerAdapter,
        },
    };

    fn adapter() -> (PlayerJsAdapter, Arc<Mutex<Posted>>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let posted = Arc::new(Mutex::new(Posted::default()));
        let adapter = PlayerJsAdapter::new(
            AdapterId(9),
            Box::new(FakeWindow(posted.clone())),
            &BackendSink::new(AdapterId(9), tx),
            &AdapterConfig::default(),
        );
        (adapter, posted)
    }

    #[tokio::test]
    async fn string_payloads_are_parsed() {
        let (mut adapter, _) = adapter();
        let event = BackendEvent::Frame(FrameMessage {
            origin: "https://vibix.me".into(),
            data: FramePayload::Text(r#"{"event":"ready"}"#.into()),
        });
        assert_eq!(adapter.handle_backend_event(event), Some(AdapterEvent::Ready));

        let garbage = BackendEvent::Frame(FrameMessage {
            origin: "https://vibix.me".into(),
            data: FramePayload::Text("<<not json>>".into()),
        });
        assert_eq!(adapter.handle_backend_event(garbage), None);
    }

    #[tokio::test]
    async fn seconds_field_carries_position() {
        let (mut adapter, _) = adapter();
        let origin = "https://player.cdnmovies.net";
        adapter.handle_backend_event(frame(origin, json!({"event": "ready"})));

        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "timeupdate", "seconds": "0.4"}))),
            None
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "timeupdate", "seconds": "75.2"}))),
            Some(AdapterEvent::Progress(75.2))
        );
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "seeked", "seconds": 75.9}))),
            Some(AdapterEvent::Progress(75.9))
        );
        // The obrut vocabulary means nothing here
        assert_eq!(
            adapter.handle_backend_event(frame(origin, json!({"event": "resumed"}))),
            None
        );
        assert_eq!(adapter.current_time(), 75.9);
    }

    #[tokio::test]
    async fn commands_are_serialized_strings() {
        let (mut adapter, posted) = adapter();
        adapter.handle_backend_event(frame("https://short.gy", json!({"event": "ready"})));
        adapter.play();
        adapter.seek_to(12.0);

        let posted = posted.lock();
        let sent: Vec<serde_json::Value> = posted
            .messages
            .iter()
            .map(|payload| match payload {
                FramePayload::Text(text) => serde_json::from_str(text).unwrap(),
                FramePayload::Json(_) => panic!("Player.js commands are strings"),
            })
            .collect();
        assert_eq!(
            sent,
            vec![
                json!({"method": "play"}),
                json!({"method": "setCurrentTime", "value": 12.0}),
            ]
        );
    }
}
