//! HTTP implementation of both transport seams.
//!
//! The event stream is a `GET` answered with `text/event-stream` and
//! decoded by [`super::sse`]; the subscription submit is a JSON `POST` to
//! the same path.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL};

use super::{EventStream, EventTransport, SubmitTransport, SubscriptionPayload, decode_event_stream};
use crate::error::RealtimeError;

/// HTTP transport bound to one server base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport with a default `reqwest` client.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `base_url` is not an absolute
    /// URL or the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, RealtimeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RealtimeError::Config(format!("http client: {err}")))?;
        Self::with_client(client, base_url)
    }

    /// Creates a transport around an existing client, e.g. one carrying
    /// default auth headers.
    ///
    /// # Errors
    ///
    /// Returns [`RealtimeError::Config`] if `base_url` is not an absolute URL.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, RealtimeError> {
        reqwest::Url::parse(base_url)
            .map_err(|err| RealtimeError::Config(format!("base url {base_url:?}: {err}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Returns the absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl EventTransport for HttpTransport {
    async fn open(&self, path: &str) -> Result<EventStream, RealtimeError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|err| RealtimeError::TransportOpen(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RealtimeError::TransportOpen(format!(
                "{url} answered with status {status}"
            )));
        }

        tracing::debug!(%url, "event stream response received");
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl SubmitTransport for HttpTransport {
    async fn submit(&self, path: &str, payload: &SubscriptionPayload) -> Result<(), RealtimeError> {
        let response = self
            .client
            .post(self.url(path))
            .json(payload)
            .send()
            .await
            .map_err(|err| RealtimeError::SubmitFailed {
                status: err.status().map(|s| s.as_u16()),
                message: err.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        Err(RealtimeError::SubmitFailed {
            status: Some(status.as_u16()),
            message,
        })
    }
}
