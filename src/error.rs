use thiserror::Error;

/// Result type for Axium operations
pub type Result<T> = std::result::Result<T, AxiumError>;

/// Errors that can occur when talking to an Axium amplifier
#[derive(Error, Debug)]
pub enum AxiumError {
    /// HTTP transport error (connection refused, reset, bad status)
    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    /// Request timed out waiting for the amplifier
    #[error("Request timeout")]
    Timeout,

    /// The long-poll stream ended
    #[error("Connection closed")]
    ConnectionClosed,

    /// Zone number has no wire encoding
    #[error("Invalid zone: {0}")]
    InvalidZone(u8),

    /// Source index outside the amplifier's eight inputs
    #[error("Invalid source index: {0}")]
    InvalidSource(u8),

    /// Source name did not match any label of the zone
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Configuration rejected before startup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl From<reqwest::Error> for AxiumError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AxiumError::Timeout
        } else {
            AxiumError::Http(err)
        }
    }
}
