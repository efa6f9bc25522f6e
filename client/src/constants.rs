use std::time::Duration;

pub const LOCAL_WS_URL: &str = "ws://localhost:8000/ws";
pub const LOCAL_API_URL: &str = "http://localhost:8000/api";

/// Current application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;
/// Pause between closing a live socket and opening its replacement
pub const REPLACE_GRACE_DELAY: Duration = Duration::from_millis(100);
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(12);

pub const SUPPRESSION_WINDOW: Duration = Duration::from_millis(1000);
pub const SEEK_TOLERANCE_SECS: f64 = 1.0;
pub const MAX_FORWARD_DELTA_SECS: f64 = 2.0;
pub const ECHO_DEBOUNCE: Duration = Duration::from_millis(300);

/// Embedded frames need time to attach their own message listener
pub const FRAME_HANDSHAKE_DELAY: Duration = Duration::from_millis(1000);
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const FRAME_TIME_REPORT_THRESHOLD_SECS: f64 = 1.0;

pub const MAX_CHAT_CHARS: usize = 1000;
