//! Unified error handling for the simya crate
//!
//! Failures are recovered as locally as possible: a venue-level fetch or
//! parse failure is logged and skipped inside the adapter, a date-level
//! failure surfaces to the driver as an empty day, and only source
//! configuration and persistence failures propagate to the caller.

use thiserror::Error;

use crate::models::Chain;

/// Errors that can occur during HTTP fetching operations
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server error with status code
    #[error("Server error: {0}")]
    ServerError(u16),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,

    /// Content decoding error
    #[error("Decoding error: {0}")]
    Decode(String),
}

/// Errors that can occur while extracting records from a site response
#[derive(Error, Debug)]
pub enum ParseError {
    /// Showtime not matching the strict HH:MM pattern
    #[error("Invalid showtime: {0:?}")]
    InvalidTime(String),

    /// Unparseable calendar date
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),

    /// A field the extractor relies on is absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Response body did not have the expected shape
    #[error("Unexpected payload: {0}")]
    UnexpectedPayload(String),

    /// Chain name not in the known set
    #[error("Unknown chain: {0:?}")]
    UnknownChain(String),
}

/// Unified error type for the simya crate
#[derive(Error, Debug)]
pub enum Error {
    /// Fetch-specific errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Parse-specific errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Chain whose adapter needs a headless-browser pipeline this build
    /// does not carry
    #[error("No adapter available for chain: {0}")]
    UnsupportedChain(Chain),

    /// Adapter construction with an empty venue list
    #[error("No venues registered for chain: {0}")]
    NoVenues(Chain),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Fetch(e) => !matches!(e, FetchError::Decode(_)),
            Self::Io(_) => true,
            Self::Parse(_)
            | Self::Database(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::UnsupportedChain(_)
            | Self::NoVenues(_) => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;
