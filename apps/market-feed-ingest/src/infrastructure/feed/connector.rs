//! Feed Connector
//!
//! Keeps a decoded record stream flowing into the ingest queue.
//!
//! ```text
//!   ┌────────────┐   ┌────────────┐   ┌─────────────────────────┐
//!   │ acquire    │──▶│ authorize  │──▶│ session (≤ N transport  │
//!   │ token      │   │            │   │ attempts, fixed delay)  │
//!   └────────────┘   └────────────┘   └─────────────────────────┘
//!         ▲           │ invalid token: doubling backoff │ exhausted
//!         │           │ other failure: fixed delay      │
//!         └───────────┴─────────────────────────────────┘
//! ```
//!
//! Transport failures and instrument fetch failures never surface as errors.
//! Token endpoint failures of an unknown kind, an empty instrument universe,
//! undecodable frames and a closed queue end the connector.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::auth::{AuthorizeClient, AuthorizeError};
use super::backoff::{BackoffConfig, TokenBackoff};
use super::instruments::{InstrumentError, resolve_instruments};
use super::session::{SessionError, SessionParams, run_session};
use super::status::{ConnectionState, FeedStatus};
use super::token::{TokenError, TokenProvider};
use crate::infrastructure::config::FeedSettings;
use crate::infrastructure::metrics::{self, ReconnectKind};
use crate::infrastructure::queue::QueueProducer;

/// Fatal connector errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Token acquisition failed in a way retrying cannot fix.
    #[error(transparent)]
    Token(#[from] TokenError),

    /// The instrument universe could not be resolved.
    #[error(transparent)]
    Instruments(#[from] InstrumentError),

    /// A session failed with a non-transport error.
    #[error(transparent)]
    Session(#[from] SessionError),
}

enum SessionOutcome {
    Cancelled,
    Exhausted,
}

/// Market data feed connector.
pub struct FeedConnector {
    settings: FeedSettings,
    client: reqwest::Client,
    tokens: TokenProvider,
    authorizer: AuthorizeClient,
    producer: QueueProducer,
    status: Arc<FeedStatus>,
    cancel: CancellationToken,
}

impl FeedConnector {
    /// Create a connector.
    #[must_use]
    pub fn new(
        settings: FeedSettings,
        client: reqwest::Client,
        producer: QueueProducer,
        status: Arc<FeedStatus>,
        cancel: CancellationToken,
    ) -> Self {
        let tokens = TokenProvider::new(
            settings.token_source.clone(),
            client.clone(),
            settings.token_retry_delay,
        );
        let authorizer = AuthorizeClient::new(client.clone(), settings.authorize_url.clone());
        Self {
            settings,
            client,
            tokens,
            authorizer,
            producer,
            status,
            cancel,
        }
    }

    /// Run until cancelled or a fatal error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] for failures retrying cannot fix.
    pub async fn run(self) -> Result<(), FeedError> {
        let Some(instruments) = self.resolve_instruments().await? else {
            return Ok(());
        };

        let mut backoff = TokenBackoff::new(BackoffConfig {
            initial_delay: self.settings.invalid_token_backoff_initial,
            max_delay: self.settings.invalid_token_backoff_max,
        });

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            self.status.set_state(ConnectionState::Authorizing);
            let Some(token) = self.tokens.acquire(&self.cancel).await? else {
                break;
            };

            let delay = match self.authorizer.authorize(&token).await {
                Ok(uri) => {
                    tracing::info!("Feed authorized");
                    backoff.reset();
                    match self.run_authorized(&uri, &instruments).await? {
                        SessionOutcome::Cancelled => break,
                        SessionOutcome::Exhausted => {
                            tracing::warn!(
                                attempts = self.settings.max_transport_retries,
                                "Transport retries exhausted, re-authorizing"
                            );
                            metrics::record_reconnect(ReconnectKind::Session);
                            None
                        }
                    }
                }
                Err(AuthorizeError::InvalidToken(message)) => {
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %message,
                        attempt = backoff.attempt_count(),
                        delay_secs = delay.as_secs(),
                        "Access token rejected, retrying with refreshed token"
                    );
                    metrics::record_reconnect(ReconnectKind::InvalidToken);
                    self.status.set_error(message);
                    Some(delay)
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        delay_secs = self.settings.authorize_retry_delay.as_secs(),
                        "Authorization failed, retrying"
                    );
                    metrics::record_reconnect(ReconnectKind::Authorize);
                    self.status.set_error(e.to_string());
                    Some(self.settings.authorize_retry_delay)
                }
            };

            self.status.set_state(ConnectionState::Disconnected);
            self.status.increment_reconnects();

            if let Some(delay) = delay {
                if !self.sleep(delay).await {
                    break;
                }
            }
        }

        self.status.set_state(ConnectionState::Disconnected);
        tracing::info!("Feed connector stopped");
        Ok(())
    }

    /// Resolve the instrument universe, retrying request failures. Returns
    /// `Ok(None)` if cancelled.
    async fn resolve_instruments(&self) -> Result<Option<Vec<String>>, InstrumentError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let resolved = tokio::select! {
                () = self.cancel.cancelled() => return Ok(None),
                resolved = resolve_instruments(&self.settings.instruments, &self.client) => resolved,
            };

            match resolved {
                Ok(instruments) => return Ok(Some(instruments)),
                Err(e) if e.is_retryable() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        delay_secs = self.settings.authorize_retry_delay.as_secs(),
                        "Instrument fetch failed, retrying"
                    );
                    self.status.set_error(e.to_string());
                    if !self.sleep(self.settings.authorize_retry_delay).await {
                        return Ok(None);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Instrument universe unusable");
                    return Err(e);
                }
            }
        }
    }

    /// Stream from one authorized URI, retrying transport failures in place.
    async fn run_authorized(
        &self,
        uri: &str,
        instruments: &[String],
    ) -> Result<SessionOutcome, SessionError> {
        let params = SessionParams {
            uri,
            instruments,
            subscribe_delay: self.settings.subscribe_delay,
            read_timeout: self.settings.read_timeout,
        };

        for attempt in 1..=self.settings.max_transport_retries {
            match run_session(params, &self.producer, &self.status, &self.cancel).await {
                Ok(()) => return Ok(SessionOutcome::Cancelled),
                Err(e) if e.is_transport() => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.settings.max_transport_retries,
                        "Stream connection failed, reconnecting"
                    );
                    metrics::record_reconnect(ReconnectKind::Transport);
                    self.status.set_error(e.to_string());
                    self.status.set_state(ConnectionState::Disconnected);
                    self.status.increment_reconnects();

                    if !self.sleep(self.settings.transport_retry_delay).await {
                        return Ok(SessionOutcome::Cancelled);
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Stream session failed fatally");
                    return Err(e);
                }
            }
        }

        Ok(SessionOutcome::Exhausted)
    }

    /// Sleep unless cancelled first. Returns `false` if cancelled.
    async fn sleep(&self, delay: Duration) -> bool {
        tokio::select! {
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::infrastructure::config::{AccessToken, InstrumentSource, TokenSource};
    use crate::infrastructure::queue::ingest_queue;

    fn settings(authorize_url: String) -> FeedSettings {
        let mut settings = FeedSettings::new(
            TokenSource::Static(AccessToken::new("token")),
            InstrumentSource::List(vec!["NSE_EQ|A".to_string()]),
        );
        settings.authorize_url = authorize_url;
        settings.authorize_retry_delay = Duration::from_millis(20);
        settings.transport_retry_delay = Duration::from_millis(5);
        settings.invalid_token_backoff_initial = Duration::from_millis(5);
        settings.invalid_token_backoff_max = Duration::from_millis(20);
        settings.subscribe_delay = Duration::ZERO;
        settings.read_timeout = Duration::from_millis(200);
        settings
    }

    #[tokio::test]
    async fn invalid_token_keeps_reauthorizing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": "error",
                "errors": [{"error_code": "UDAPI100050"}]
            })))
            .mount(&server)
            .await;

        let (producer, _consumer) = ingest_queue(8);
        let status = Arc::new(FeedStatus::new());
        let cancel = CancellationToken::new();
        let connector = FeedConnector::new(
            settings(format!("{}/authorize", server.uri())),
            reqwest::Client::new(),
            producer,
            Arc::clone(&status),
            cancel.clone(),
        );

        let handle = tokio::spawn(connector.run());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        assert!(server.received_requests().await.unwrap().len() >= 3);
        assert!(status.snapshot().reconnects >= 2);
        assert_eq!(status.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_stream_falls_back_to_reauthorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"authorized_redirect_uri": "ws://127.0.0.1:1/stream"}
            })))
            .mount(&server)
            .await;

        let (producer, _consumer) = ingest_queue(8);
        let status = Arc::new(FeedStatus::new());
        let cancel = CancellationToken::new();
        let connector = FeedConnector::new(
            settings(format!("{}/authorize", server.uri())),
            reqwest::Client::new(),
            producer,
            Arc::clone(&status),
            cancel.clone(),
        );

        let handle = tokio::spawn(connector.run());
        tokio::time::sleep(Duration::from_millis(150)).await;
        cancel.cancel();
        handle.await.unwrap().unwrap();

        // Each authorization is followed by three connect attempts.
        let authorizations = server.received_requests().await.unwrap().len() as u64;
        assert!(authorizations >= 2);
        assert!(status.snapshot().reconnects >= 3 * (authorizations - 1));
    }

    /// Listener that accepts TCP connections and drops them before the
    /// WebSocket handshake. Returns its URI and the accept count.
    async fn refusing_stream() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let uri = format!("ws://{}/stream", listener.local_addr().unwrap());
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                drop(socket);
            }
        });

        (uri, accepted)
    }

    #[tokio::test]
    async fn transport_attempts_stop_at_three_per_authorization() {
        let (stream_uri, attempts) = refusing_stream().await;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"authorized_redirect_uri": stream_uri}
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "status": "error",
                "errors": [{"error_code": "UDAPI1", "message": "maintenance"}]
            })))
            .mount(&server)
            .await;

        let mut settings = settings(format!("{}/authorize", server.uri()));
        settings.read_timeout = Duration::from_secs(2);
        settings.authorize_retry_delay = Duration::from_secs(30);

        let (producer, _consumer) = ingest_queue(8);
        let status = Arc::new(FeedStatus::new());
        let cancel = CancellationToken::new();
        let connector = FeedConnector::new(
            settings,
            reqwest::Client::new(),
            producer,
            Arc::clone(&status),
            cancel.clone(),
        );
        let handle = tokio::spawn(connector.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            while server.received_requests().await.unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connector never re-authorized");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn instrument_fetch_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/instruments"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/instruments"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"instruments": ["NSE_EQ|A"]})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "status": "error",
                "errors": [{"error_code": "UDAPI100050"}]
            })))
            .mount(&server)
            .await;

        let mut settings = settings(format!("{}/authorize", server.uri()));
        settings.instruments = InstrumentSource::Url(format!("{}/instruments", server.uri()));

        let (producer, _consumer) = ingest_queue(8);
        let cancel = CancellationToken::new();
        let connector = FeedConnector::new(
            settings,
            reqwest::Client::new(),
            producer,
            Arc::new(FeedStatus::new()),
            cancel.clone(),
        );
        let handle = tokio::spawn(connector.run());

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let requests = server.received_requests().await.unwrap();
                if requests.iter().any(|r| r.url.path() == "/authorize") {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("connector never reached authorization");

        cancel.cancel();
        handle.await.unwrap().unwrap();

        let instrument_requests = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/instruments")
            .count();
        assert_eq!(instrument_requests, 3);
    }

    #[tokio::test]
    async fn unreachable_instrument_url_waits_for_cancel() {
        let mut settings = settings("http://127.0.0.1:1/authorize".to_string());
        settings.instruments = InstrumentSource::Url("http://127.0.0.1:1/instruments".to_string());

        let (producer, _consumer) = ingest_queue(8);
        let status = Arc::new(FeedStatus::new());
        let cancel = CancellationToken::new();
        let connector = FeedConnector::new(
            settings,
            reqwest::Client::new(),
            producer,
            Arc::clone(&status),
            cancel.clone(),
        );
        let handle = tokio::spawn(connector.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished());
        assert!(status.snapshot().last_error.is_some());

        cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn empty_instrument_universe_is_fatal() {
        let mut settings = settings("http://127.0.0.1:1".to_string());
        settings.instruments = InstrumentSource::List(vec![]);

        let (producer, _consumer) = ingest_queue(8);
        let connector = FeedConnector::new(
            settings,
            reqwest::Client::new(),
            producer,
            Arc::new(FeedStatus::new()),
            CancellationToken::new(),
        );

        let err = connector.run().await.unwrap_err();
        assert!(matches!(err, FeedError::Instruments(InstrumentError::Empty)));
    }

    #[tokio::test]
    async fn fatal_token_error_ends_connector() {
        let mut settings = settings("http://127.0.0.1:1".to_string());
        settings.token_source = TokenSource::Endpoint("not a url".to_string());

        let (producer, _consumer) = ingest_queue(8);
        let connector = FeedConnector::new(
            settings,
            reqwest::Client::new(),
            producer,
            Arc::new(FeedStatus::new()),
            CancellationToken::new(),
        );

        let err = connector.run().await.unwrap_err();
        assert!(matches!(err, FeedError::Token(TokenError::Fatal(_))));
    }
}
