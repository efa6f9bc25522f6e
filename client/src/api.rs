//! Client for the room lookup and video catalog REST endpoints.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::invite::RoomId;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
pub struct RoomDescriptor {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub host_username: String,
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub host_control: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub state: Option<StoredPlayback>,
}

/// Last playback position the authority persisted for a room
#[derive(Debug, Clone, Deserialize)]
pub struct StoredPlayback {
    #[serde(default)]
    pub current_time: f64,
    #[serde(default)]
    pub is_playing: bool,
    #[serde(default)]
    pub last_updated: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub title: String,
    #[serde(rename = "source_url", alias = "video_url")]
    pub video_url: String,
    #[serde(default)]
    pub source_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// List endpoints answer either paginated or as a bare array
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Paginated { results: Vec<T> },
    Bare(Vec<T>),
}

impl<T> Listing<T> {
    fn into_items(self) -> Vec<T> {
        match self {
            Listing::Paginated { results } => results,
            Listing::Bare(items) => items,
        }
    }
}

pub struct RoomApi {
    client: reqwest::Client,
    base_url: String,
}

impl RoomApi {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get_room(&self, room: &RoomId) -> Result<RoomDescriptor> {
        let url = format!(
            "{}/rooms/{}/",
            self.base_url,
            urlencoding::encode(room.as_str())
        );
        debug!("Fetching room {url}");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .with_context(|| format!("Room {room} lookup failed"))?;
        response
            .json::<RoomDescriptor>()
            .await
            .context("Failed to parse room descriptor")
    }

    pub async fn search_videos(&self, query: &str) -> Result<Vec<CatalogEntry>> {
        let url = format!("{}/videos/", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("search", query.trim())])
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?
            .error_for_status()
            .context("Video search failed")?;
        let listing = response
            .json::<Listing<CatalogEntry>>()
            .await
            .context("Failed to parse video catalog")?;
        Ok(listing.into_items())
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

/// Decimal fields may be serialized as strings
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}
