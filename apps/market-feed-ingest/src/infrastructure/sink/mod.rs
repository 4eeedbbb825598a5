//! InfluxDB Sink Adapter
//!
//! Implements the [`Sink`] port over the InfluxDB v2 HTTP API.
//!
//! - Write: `POST {url}/api/v2/write?org=..&bucket=..&precision=ms`
//! - Health: `GET {url}/health`, healthy only on 200

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::application::ports::{Sink, SinkError};
use crate::domain::BatchPayload;
use crate::infrastructure::config::SinkSettings;

/// Path of the health probe, relative to the sink URL.
pub const HEALTH_PATH: &str = "/health";

/// HTTP client for the time-series sink.
#[derive(Debug, Clone)]
pub struct SinkClient {
    client: Client,
    write_url: String,
    health_url: String,
    token: String,
}

impl SinkClient {
    /// Create a client for the configured sink.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: &SinkSettings, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let base = settings.url.trim_end_matches('/');
        let mut write_url = reqwest::Url::parse(&format!("{base}/api/v2/write"))
            .map_err(|e| SinkError::Transport(format!("invalid sink url: {e}")))?;
        write_url
            .query_pairs_mut()
            .append_pair("org", &settings.org)
            .append_pair("bucket", &settings.bucket)
            .append_pair("precision", "ms");

        Ok(Self {
            client,
            write_url: write_url.into(),
            health_url: format!("{base}{HEALTH_PATH}"),
            token: settings.token().to_string(),
        })
    }
}

#[async_trait]
impl Sink for SinkClient {
    async fn write(&self, payload: &BatchPayload) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(payload.as_str().to_owned())
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(lines = payload.line_count(), "Batch written to sink");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SinkError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn is_healthy(&self) -> bool {
        match self.client.get(&self.health_url).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                tracing::debug!(error = %e, "Sink health probe failed");
                false
            }
        }
    }
}
