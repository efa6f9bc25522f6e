//! Runtime configuration with environment overrides.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use tracing::warn;

use crate::constants::*;

/// Connection settings for the room transport
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Base WebSocket endpoint; rooms live under `{server_url}/rooms/{id}/`
    pub server_url: String,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub replace_grace_delay: Duration,
    pub keepalive_interval: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            server_url: LOCAL_WS_URL.to_string(),
            reconnect_base_delay: RECONNECT_BASE_DELAY,
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            replace_grace_delay: REPLACE_GRACE_DELAY,
            keepalive_interval: KEEPALIVE_INTERVAL,
        }
    }
}

/// Reconciliation heuristics used by the coordinator
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub suppression_window: Duration,
    pub seek_tolerance_secs: f64,
    pub max_forward_delta_secs: f64,
    pub echo_debounce: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            suppression_window: SUPPRESSION_WINDOW,
            seek_tolerance_secs: SEEK_TOLERANCE_SECS,
            max_forward_delta_secs: MAX_FORWARD_DELTA_SECS,
            echo_debounce: ECHO_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub handshake_delay: Duration,
    pub progress_poll_interval: Duration,
    pub frame_time_threshold_secs: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            handshake_delay: FRAME_HANDSHAKE_DELAY,
            progress_poll_interval: PROGRESS_POLL_INTERVAL,
            frame_time_threshold_secs: FRAME_TIME_REPORT_THRESHOLD_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub transport: TransportConfig,
    pub sync: SyncConfig,
    pub adapter: AdapterConfig,
    pub api_url: String,
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            sync: SyncConfig::default(),
            adapter: AdapterConfig::default(),
            api_url: LOCAL_API_URL.to_string(),
            data_dir: None,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TANDEM_*` environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = env::var("TANDEM_WS_URL") {
            if !url.trim().is_empty() {
                config.transport.server_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(url) = env::var("TANDEM_API_URL") {
            if !url.trim().is_empty() {
                config.api_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(ms) = env_parse::<u64>("TANDEM_RECONNECT_BASE_MS") {
            config.transport.reconnect_base_delay = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_parse::<u32>("TANDEM_MAX_RECONNECTS") {
            config.transport.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = env_parse::<u64>("TANDEM_SUPPRESSION_MS") {
            config.sync.suppression_window = Duration::from_millis(ms);
        }
        if let Some(secs) = env_secs("TANDEM_SEEK_TOLERANCE") {
            config.sync.seek_tolerance_secs = secs;
        }
        if let Some(secs) = env_secs("TANDEM_MAX_FORWARD_DELTA") {
            config.sync.max_forward_delta_secs = secs;
        }
        if let Ok(dir) = env::var("TANDEM_DATA_DIR") {
            if !dir.trim().is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        config
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring invalid value for {key}: {raw:?}");
            None
        }
    }
}

/// A finite, non-negative number of seconds
fn env_secs(key: &str) -> Option<f64> {
    let secs = env_parse::<f64>(key)?;
    if secs.is_finite() && secs >= 0.0 {
        Some(secs)
    } else {
        warn!("Ignoring invalid value for {key}: {secs}");
        None
    }
}
