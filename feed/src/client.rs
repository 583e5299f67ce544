//! Events API client implementation

use crate::error::FeedError;
use crate::types::FeedPage;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Events API client
#[derive(Debug, Clone)]
pub struct EventsClient {
    client: Client,
}

impl EventsClient {
    /// Create a client with the default request timeout
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ClientSetup` if the TLS backend cannot be initialised
    pub fn new() -> Result<Self, FeedError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`
    ///
    /// # Errors
    ///
    /// Returns `FeedError::ClientSetup` if the TLS backend cannot be initialised
    pub fn with_timeout(timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FeedError::ClientSetup(e.to_string()))?;
        Ok(Self { client })
    }

    /// Fetch one page of events
    ///
    /// # Errors
    ///
    /// Returns `FeedError::RequestFailed` for network failures,
    /// `FeedError::ApiError` for any status other than 200 and
    /// `FeedError::ResponseParseFailed` for an unexpected body
    pub async fn fetch_page(&self, url: &str) -> Result<FeedPage, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json::<FeedPage>()
                .await
                .map_err(|e| FeedError::ResponseParseFailed(e.to_string())),
            status => Err(FeedError::ApiError {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }
}
