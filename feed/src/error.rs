//! Error types for the events API client

use showrunner_core::SourceError;
use thiserror::Error;

/// Errors that can occur when talking to the events API
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Requests-per-minute must be positive
    #[error("Invalid request rate: {0} requests per minute")]
    InvalidRate(u32),

    /// The configured URL is not usable
    #[error("Invalid events API URL: {0}")]
    InvalidUrl(String),

    /// HTTP client could not be built
    #[error("HTTP client setup failed: {0}")]
    ClientSetup(String),

    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// API answered with a non-200 status
    #[error("API error (status {status}) from {url}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Response parsing failed
    #[error("Response parsing failed: {0}")]
    ResponseParseFailed(String),
}

impl From<FeedError> for SourceError {
    fn from(err: FeedError) -> Self {
        match err {
            FeedError::ApiError { status, url } => Self::Status { status, url },
            FeedError::RequestFailed(msg) => Self::Transport(msg),
            FeedError::ResponseParseFailed(msg) => Self::Decode(msg),
            FeedError::InvalidRate(_) | FeedError::InvalidUrl(_) | FeedError::ClientSetup(_) => {
                Self::Connection(err.to_string())
            },
        }
    }
}
