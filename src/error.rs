//! Unified error handling for factionrelay.
//!
//! Every error a poll cycle can observe is a [`FetchError`]. The poller
//! contains them per feed: they are logged, labeled for metrics and retried
//! on the next tick. Nothing in here is fatal to the process.

use thiserror::Error;

// ============================================================================
// Fetch Errors (transport and feed decoding)
// ============================================================================

/// Errors raised while fetching or decoding a remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("remote error: {0}")]
    Upstream(String),

    /// The response parsed but did not have the shape the adapter expects.
    /// Usually means the remote API changed underneath us.
    #[error("unexpected response shape: {0}")]
    AdapterDecode(String),
}

impl FetchError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Timeout => "timeout",
            Self::Status(_) => "status",
            Self::Upstream(_) => "upstream",
            Self::AdapterDecode(_) => "decode",
        }
    }

    /// Whether this error points at a contract change rather than a flaky link.
    #[inline]
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::AdapterDecode(_))
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::AdapterDecode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        Self::AdapterDecode(err.to_string())
    }
}

/// Result type for feed fetches.
pub type FetchResult<T> = Result<T, FetchError>;

// ============================================================================
// IRC Errors (channel sink connection)
// ============================================================================

/// Errors from the IRC client connection.
#[derive(Debug, Error)]
pub enum IrcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line codec error: {0}")]
    Codec(#[from] tokio_util::codec::LinesCodecError),

    #[error("connection closed by server")]
    Closed,
}
