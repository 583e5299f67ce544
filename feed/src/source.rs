//! Pull source: long-polls the events API and follows its cursor.

use crate::client::EventsClient;
use crate::error::FeedError;
use showrunner_core::{ErrorPolicy, Event, EventSource, SourceError, SourceFactory};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Sleep between polls for a budget of `rpm` requests per minute.
///
/// The cadence is `60 / (rpm / 10)` seconds, so 1000 rpm polls every 600ms.
///
/// # Errors
///
/// Returns [`FeedError::InvalidRate`] if `rpm` is zero.
pub fn poll_interval(rpm: u32) -> Result<Duration, FeedError> {
    if rpm == 0 {
        return Err(FeedError::InvalidRate(rpm));
    }
    Ok(Duration::from_nanos(600_000_000_000 / u64::from(rpm)))
}

/// Opens [`PollingSource`]s starting at a fixed URL.
#[derive(Debug, Clone)]
pub struct PollingSourceFactory {
    client: EventsClient,
    start_url: String,
    interval: Duration,
}

impl PollingSourceFactory {
    /// Creates a factory polling `url` at the cadence for `rpm`.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::InvalidRate`] for zero `rpm`,
    /// [`FeedError::InvalidUrl`] for a URL that is not `http(s)://`, and
    /// [`FeedError::ClientSetup`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, rpm: u32) -> Result<Self, FeedError> {
        let start_url = url.into();
        if !(start_url.starts_with("http://") || start_url.starts_with("https://")) {
            return Err(FeedError::InvalidUrl(start_url));
        }
        Ok(Self {
            client: EventsClient::new()?,
            start_url,
            interval: poll_interval(rpm)?,
        })
    }

    /// Overrides the sleep between polls.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The sleep between polls.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

impl SourceFactory for PollingSourceFactory {
    fn name(&self) -> &str {
        "events-api"
    }

    fn open(&self) -> Pin<Box<dyn Future<Output = Result<Box<dyn EventSource>, SourceError>> + Send + '_>> {
        let source = PollingSource {
            client: self.client.clone(),
            next_url: self.start_url.clone(),
            interval: self.interval,
        };
        tracing::info!(url = %source.next_url, interval_ms = source.interval.as_millis(), "Polling events API");
        Box::pin(async move {
            let source: Box<dyn EventSource> = Box::new(source);
            Ok(source)
        })
    }
}

/// Long-polling source over the events API.
///
/// Each batch is one GET of the current cursor URL. On a 200 the page's
/// events are returned in order and the cursor advances to `nextUrl`. Any
/// failure leaves the cursor in place, so the same URL is requested again
/// after the regular interval.
#[derive(Debug)]
pub struct PollingSource {
    client: EventsClient,
    next_url: String,
    interval: Duration,
}

impl PollingSource {
    /// The URL the next poll will request.
    #[must_use]
    pub fn next_url(&self) -> &str {
        &self.next_url
    }

    async fn poll(&mut self) -> Result<Vec<Event>, SourceError> {
        let page = self.client.fetch_page(&self.next_url).await?;

        let url = &self.next_url;
        let events: Vec<Event> = page
            .events
            .into_iter()
            .enumerate()
            .map(|(idx, event)| event.into_event(|| format!("{url}#{idx}")))
            .collect();

        tracing::debug!(count = events.len(), next_url = %page.next_url, "Polled events");
        self.next_url = page.next_url;
        Ok(events)
    }
}

impl EventSource for PollingSource {
    fn name(&self) -> &str {
        "events-api"
    }

    fn next_batch(&mut self) -> Pin<Box<dyn Future<Output = Result<Vec<Event>, SourceError>> + Send + '_>> {
        Box::pin(self.poll())
    }

    fn pause(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn error_policy(&self) -> ErrorPolicy {
        ErrorPolicy::Retry
    }
}
