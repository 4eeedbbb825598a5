//! Delivery Notification Adapter
//!
//! Implements the [`Notifier`] port: a single JSON `POST` telling the
//! downstream consumer that fresh data reached the sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::application::ports::{Notifier, NotifyError};

/// Message carried by every notification.
pub const NOTIFICATION_MESSAGE: &str = "Data feed has been successfully transferred to InfluxDB";

#[derive(Debug, Serialize)]
struct NotificationBody<'a> {
    message: &'a str,
}

/// HTTP notifier.
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    client: Client,
    url: String,
}

impl HttpNotifier {
    /// Create a notifier posting to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&NotificationBody {
                message: NOTIFICATION_MESSAGE,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::OK => Ok(()),
            other => Err(NotifyError::Rejected(other.as_u16())),
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn posts_fixed_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/message"))
            .and(body_json(serde_json::json!({ "message": NOTIFICATION_MESSAGE })))
            .respond_with(ResponseTemplate::new(200).set_body_string("Message Received"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            HttpNotifier::new(format!("{}/message", server.uri()), Duration::from_secs(5)).unwrap();
        notifier.notify().await.unwrap();
    }

    #[tokio::test]
    async fn non_200_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;

        let notifier = HttpNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = notifier.notify().await.unwrap_err();
        assert!(matches!(err, NotifyError::Rejected(201)));
    }

    #[tokio::test]
    async fn unreachable_is_failure() {
        let notifier = HttpNotifier::new("http://127.0.0.1:9/message", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            notifier.notify().await,
            Err(NotifyError::Transport(_))
        ));
    }
}
