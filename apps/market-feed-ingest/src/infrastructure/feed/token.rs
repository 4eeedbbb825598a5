//! Access Token Acquisition
//!
//! A static token is used as-is. Otherwise the token endpoint is polled until
//! it yields `{"access_token": "<string>"}`: transport failures, non-200
//! answers and malformed bodies are retried every 2 seconds, indefinitely.
//! Anything else (an unbuildable request, for instance) is fatal.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::{AccessToken, TokenSource};

/// Token acquisition errors.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The endpoint could not be reached.
    #[error("token endpoint unreachable: {0}")]
    Transport(String),

    /// The endpoint answered with a non-200 status.
    #[error("token endpoint returned {status}: {error}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The body's `error` field, if any.
        error: String,
    },

    /// The body was not JSON or had no string `access_token`.
    #[error("malformed token response: {0}")]
    Malformed(String),

    /// The request itself could not be made.
    #[error("token request failed: {0}")]
    Fatal(String),
}

impl TokenError {
    /// Whether waiting and retrying can fix this.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::Fatal(_))
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Fatal(err.to_string())
        } else if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Supplies access tokens to the feed connector.
#[derive(Debug, Clone)]
pub struct TokenProvider {
    source: TokenSource,
    client: reqwest::Client,
    retry_delay: Duration,
}

impl TokenProvider {
    /// Create a provider.
    #[must_use]
    pub const fn new(source: TokenSource, client: reqwest::Client, retry_delay: Duration) -> Self {
        Self {
            source,
            client,
            retry_delay,
        }
    }

    /// Obtain a token, retrying retryable failures until cancelled.
    ///
    /// Returns `Ok(None)` if cancelled while waiting.
    ///
    /// # Errors
    ///
    /// Returns a non-retryable [`TokenError`].
    pub async fn acquire(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<AccessToken>, TokenError> {
        let url = match &self.source {
            TokenSource::Static(token) => return Ok(Some(token.clone())),
            TokenSource::Endpoint(url) => url,
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            tracing::debug!(attempt, "Fetching access token");

            let fetched = tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                fetched = self.fetch_once(url) => fetched,
            };

            match fetched {
                Ok(token) => {
                    tracing::info!(attempt, "Access token fetched");
                    return Ok(Some(token));
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_ms = self.retry_delay.as_millis(),
                        "Token fetch failed, retrying"
                    );
                }
                Err(e) => {
                    tracing::error!(error = %e, "Token fetch failed fatally");
                    return Err(e);
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return Ok(None),
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<AccessToken, TokenError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        if status != reqwest::StatusCode::OK {
            let error = body
                .get("error")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            return Err(TokenError::Status {
                status: status.as_u16(),
                error,
            });
        }

        match body.get("access_token") {
            Some(serde_json::Value::String(token)) => Ok(AccessToken::new(token.clone())),
            Some(_) => Err(TokenError::Malformed(
                "access_token is not a string".to_string(),
            )),
            None => Err(TokenError::Malformed("access_token missing".to_string())),
        }
    }
}
