use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::media::MediaSource;

/// Messages sent from this client to the room authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { username: String },
    Play { current_time: f64 },
    Pause { current_time: f64 },
    Seek { current_time: f64, is_playing: bool },
    VideoChange { video_url: String },
    UsernameChange { username: String },
    Chat { content: String },
}

/// Messages relayed by the room authority (must match the server protocol)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    RoomState {
        #[serde(default)]
        current_time: f64,
        #[serde(default)]
        is_playing: bool,
        #[serde(default)]
        video_url: Option<String>,
    },
    Play {
        current_time: f64,
    },
    Pause {
        current_time: f64,
    },
    Seek {
        current_time: f64,
        /// The authority relays seeks without the sender's play flag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_playing: Option<bool>,
    },
    VideoChanged {
        #[serde(default)]
        video_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    UserList {
        #[serde(default)]
        users: Vec<String>,
    },
    ChatMessage(ChatEntry),
    ChatHistory {
        #[serde(default)]
        messages: Vec<ChatEntry>,
    },
    ChatError {
        #[serde(default)]
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Discriminator of a known inbound message, used as a subscription key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    RoomState,
    Play,
    Pause,
    Seek,
    VideoChanged,
    UserList,
    ChatMessage,
    ChatHistory,
    ChatError,
}

impl MessageKind {
    pub fn from_wire(tag: &str) -> Option<Self> {
        Some(match tag {
            "room_state" => Self::RoomState,
            "play" => Self::Play,
            "pause" => Self::Pause,
            "seek" => Self::Seek,
            "video_changed" => Self::VideoChanged,
            "user_list" => Self::UserList,
            "chat_message" => Self::ChatMessage,
            "chat_history" => Self::ChatHistory,
            "chat_error" => Self::ChatError,
            _ => return None,
        })
    }
}

impl ServerMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ServerMessage::RoomState { .. } => MessageKind::RoomState,
            ServerMessage::Play { .. } => MessageKind::Play,
            ServerMessage::Pause { .. } => MessageKind::Pause,
            ServerMessage::Seek { .. } => MessageKind::Seek,
            ServerMessage::VideoChanged { .. } => MessageKind::VideoChanged,
            ServerMessage::UserList { .. } => MessageKind::UserList,
            ServerMessage::ChatMessage(_) => MessageKind::ChatMessage,
            ServerMessage::ChatHistory { .. } => MessageKind::ChatHistory,
            ServerMessage::ChatError { .. } => MessageKind::ChatError,
        }
    }

    /// Playback-relevant view of this message, if any
    pub fn to_sync_event(&self) -> Option<SyncEvent> {
        let event = match self {
            ServerMessage::RoomState {
                current_time,
                is_playing,
                video_url,
            } => SyncEvent::RoomStateSnapshot {
                state: PlaybackState::new(*current_time, *is_playing),
                source: video_url.as_deref().and_then(MediaSource::from_url),
            },
            ServerMessage::Play { current_time } => SyncEvent::Play {
                at: clamp_time(*current_time),
            },
            ServerMessage::Pause { current_time } => SyncEvent::Pause {
                at: clamp_time(*current_time),
            },
            ServerMessage::Seek {
                current_time,
                is_playing,
            } => SyncEvent::Seek {
                at: clamp_time(*current_time),
                still_playing: *is_playing,
            },
            ServerMessage::VideoChanged { video_url, title } => SyncEvent::VideoChanged {
                source: video_url.as_deref().and_then(MediaSource::from_url),
                title: title.clone(),
            },
            ServerMessage::UserList { users } => SyncEvent::ParticipantListChanged {
                names: users.clone(),
            },
            ServerMessage::ChatMessage(_)
            | ServerMessage::ChatHistory { .. }
            | ServerMessage::ChatError { .. } => return None,
        };
        Some(event)
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Known(ServerMessage),
    /// Well-formed envelope with a tag this client does not understand
    Unknown { kind: String, payload: Value },
}

/// Decode one text frame. Undecodable input yields `None`.
pub fn decode_inbound(text: &str) -> Option<Inbound> {
    let payload: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            debug!("Dropping non-JSON frame: {e}");
            return None;
        }
    };
    let kind = payload.get("type")?.as_str()?.to_string();

    if MessageKind::from_wire(&kind).is_none() {
        return Some(Inbound::Unknown { kind, payload });
    }

    match serde_json::from_value::<ServerMessage>(payload) {
        Ok(message) => Some(Inbound::Known(message)),
        Err(e) => {
            debug!("Dropping malformed {kind} message: {e}");
            None
        }
    }
}

/// Logical shared playback position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackState {
    pub current_time: f64,
    pub is_playing: bool,
}

impl PlaybackState {
    pub fn new(current_time: f64, is_playing: bool) -> Self {
        Self {
            current_time: clamp_time(current_time),
            is_playing,
        }
    }
}

/// Events the coordinator consumes from the transport
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Play {
        at: f64,
    },
    Pause {
        at: f64,
    },
    Seek {
        at: f64,
        still_playing: Option<bool>,
    },
    VideoChanged {
        source: Option<MediaSource>,
        title: Option<String>,
    },
    RoomStateSnapshot {
        state: PlaybackState,
        source: Option<MediaSource>,
    },
    ParticipantListChanged {
        names: Vec<String>,
    },
}

/// Positions are never negative; garbage input collapses to the start.
pub fn clamp_time(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        0.0
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
