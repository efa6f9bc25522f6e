use thiserror::Error;

/// Errors surfaced by the room transport
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("channel not ready")]
    NotReady,

    #[error("transport was disconnected and cannot be reused")]
    Terminated,

    #[error("invalid room address: {0}")]
    InvalidAddress(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A video backend refused or failed a request
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend rejected command: {0}")]
    Rejected(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("backend not supported here: {0}")]
    Unsupported(&'static str),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("chat message is empty")]
    EmptyChat,

    #[error("chat message too long ({len} > {max} characters)")]
    ChatTooLong { len: usize, max: usize },

    #[error("room session has ended")]
    Closed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
