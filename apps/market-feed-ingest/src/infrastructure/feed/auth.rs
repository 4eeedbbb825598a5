//! Feed Authorization
//!
//! Exchanges an access token for a one-time WebSocket redirect URI.
//!
//! # Response shapes
//!
//! - Success: `{"status":"success","data":{"authorized_redirect_uri":"wss://..."}}`
//! - Error: `{"status":"error","errors":[{"error_code":"UDAPI100050","message":"..."}]}`
//!
//! `UDAPI100050` marks an invalid or expired token and is reported separately
//! so the connector can back off and refresh the token.

use crate::infrastructure::config::AccessToken;

/// Error code the authorize endpoint uses for an invalid or expired token.
pub const INVALID_TOKEN_CODE: &str = "UDAPI100050";

/// Authorization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthorizeError {
    /// The token is invalid or expired.
    #[error("invalid or expired access token: {0}")]
    InvalidToken(String),

    /// Any other refusal, or an unusable response.
    #[error("authorization rejected: {0}")]
    Rejected(String),

    /// The endpoint could not be reached.
    #[error("authorization request failed: {0}")]
    Network(String),
}

/// Client for the authorize endpoint.
#[derive(Debug, Clone)]
pub struct AuthorizeClient {
    client: reqwest::Client,
    url: String,
}

impl AuthorizeClient {
    /// Create a client.
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Request a redirect URI for the stream.
    ///
    /// # Errors
    ///
    /// Returns the classified [`AuthorizeError`].
    pub async fn authorize(&self, token: &AccessToken) -> Result<String, AuthorizeError> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(|e| AuthorizeError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthorizeError::Network(e.to_string()))?;

        let Ok(body) = serde_json::from_str::<serde_json::Value>(&text) else {
            return Err(AuthorizeError::Rejected(format!(
                "non-JSON response with status {status}"
            )));
        };

        classify(&body)
    }
}

/// Classify an authorize response body.
///
/// # Errors
///
/// Returns [`AuthorizeError::InvalidToken`] for the invalid-token code and
/// [`AuthorizeError::Rejected`] for every other error or a missing URI.
pub fn classify(body: &serde_json::Value) -> Result<String, AuthorizeError> {
    if body.get("status").and_then(serde_json::Value::as_str) == Some("error") {
        let errors = body
            .get("errors")
            .and_then(serde_json::Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        for err in errors {
            if err.get("error_code").and_then(serde_json::Value::as_str) == Some(INVALID_TOKEN_CODE)
            {
                let message = err
                    .get("message")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("Invalid or expired access token.");
                return Err(AuthorizeError::InvalidToken(message.to_string()));
            }
        }

        let message = errors
            .first()
            .and_then(|e| e.get("message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or("authorization failed with error status");
        return Err(AuthorizeError::Rejected(message.to_string()));
    }

    body.pointer("/data/authorized_redirect_uri")
        .and_then(serde_json::Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| AuthorizeError::Rejected("response has no redirect URI".to_string()))
}
