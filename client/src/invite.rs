use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use urlencoding::{decode, encode};

/// Opaque room identifier, stable for the lifetime of a room
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Blank identifiers and ones containing path separators are rejected
    pub fn new(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty()
            || trimmed.contains(['/', '?', '#'])
            || trimmed.contains(char::is_whitespace)
        {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomLink {
    pub room: RoomId,
    /// Display name suggested by the link, if any
    pub username: Option<String>,
}

/// Shareable link to a room on the web front end
pub fn room_link(origin: &str, room: &RoomId) -> String {
    format!("{}/room/{}", origin.trim_end_matches('/'), encode(room.as_str()))
}

/// Accepts a full room link or a bare room identifier
pub fn parse_room_link(input: &str) -> Option<RoomLink> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return RoomId::new(trimmed).map(|room| RoomLink {
            room,
            username: None,
        });
    }

    let url = Url::parse(trimmed).ok()?;
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let room = loop {
        match segments.next()? {
            "room" | "rooms" => break segments.next()?,
            _ => continue,
        }
    };
    let room = RoomId::new(decode(room).ok()?.as_ref())?;

    let username = url
        .query_pairs()
        .find(|(key, _)| key == "username")
        .map(|(_, value)| value.trim().to_string())
        .filter(|name| !name.is_empty());

    Some(RoomLink { room, username })
}
