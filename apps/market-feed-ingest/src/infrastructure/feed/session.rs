//! Streaming Session
//!
//! One connection to an authorized stream URI:
//!
//! 1. Connect (TLS verified against webpki roots)
//! 2. Wait, then send the subscription as a binary frame
//! 3. Read and validate the `market_info` frame
//! 4. Discard the snapshot frame
//! 5. Decode live frames and enqueue their records until failure or shutdown
//!
//! Failures of the transport are reported as [`SessionError::Transport`] and
//! retried by the connector; everything else ends the connector.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, decode_frame, validate_market_info};
use super::status::{ConnectionState, FeedStatus};
use crate::infrastructure::metrics;
use crate::infrastructure::queue::QueueProducer;

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Connection closed, handshake refused, I/O failure or read timeout.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The stream URI is unusable.
    #[error("invalid stream URI: {0}")]
    InvalidUri(String),

    /// A frame could not be decoded, or the leading info frame was invalid.
    #[error("frame error: {0}")]
    Codec(#[from] CodecError),

    /// The subscription request could not be serialized.
    #[error("failed to encode subscription: {0}")]
    Subscription(#[from] serde_json::Error),

    /// The ingest queue consumer is gone.
    #[error("ingest queue closed")]
    QueueClosed,
}

impl SessionError {
    /// Whether reconnecting can fix this.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<tungstenite::Error> for SessionError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Url(e) => Self::InvalidUri(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

// =============================================================================
// Subscription Request
// =============================================================================

/// Subscription handshake, e.g.
/// `{"guid":"...","method":"sub","data":{"mode":"full","instrumentKeys":[...]}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    /// Request id.
    pub guid: String,
    /// Always `sub`.
    pub method: &'static str,
    /// Mode and instruments.
    pub data: SubscriptionData,
}

/// Subscription body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionData {
    /// Detail level; `full` carries OHLC candles.
    pub mode: &'static str,
    /// Instrument keys.
    pub instrument_keys: Vec<String>,
}

impl SubscriptionRequest {
    /// Full-mode subscription with a fresh request id.
    #[must_use]
    pub fn full(instruments: &[String]) -> Self {
        Self {
            guid: uuid::Uuid::new_v4().to_string(),
            method: "sub",
            data: SubscriptionData {
                mode: "full",
                instrument_keys: instruments.to_vec(),
            },
        }
    }

    /// Serialize to the binary frame sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        Ok(Message::Binary(serde_json::to_vec(self)?.into()))
    }
}

// =============================================================================
// Session
// =============================================================================

/// Inputs for one streaming session.
#[derive(Debug, Clone, Copy)]
pub struct SessionParams<'a> {
    /// Authorized stream URI.
    pub uri: &'a str,
    /// Instruments to subscribe to.
    pub instruments: &'a [String],
    /// Pause between connecting and subscribing.
    pub subscribe_delay: Duration,
    /// Idle read timeout.
    pub read_timeout: Duration,
}

/// Run one session until a failure or cancellation.
///
/// Returns `Ok(())` only when cancelled.
///
/// # Errors
///
/// Returns a [`SessionError`]; the caller retries transport failures.
pub async fn run_session(
    params: SessionParams<'_>,
    producer: &QueueProducer,
    status: &FeedStatus,
    cancel: &CancellationToken,
) -> Result<(), SessionError> {
    status.set_state(ConnectionState::Connecting);
    tracing::info!("Connecting to market data stream");

    let connect = tokio::time::timeout(
        params.read_timeout,
        tokio_tungstenite::connect_async(params.uri),
    );
    let (ws_stream, _response) = tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        result = connect => result
            .map_err(|_| SessionError::Transport("connect timed out".to_string()))??,
    };
    tracing::info!("Stream connection established");

    let (mut write, mut read) = ws_stream.split();

    tokio::select! {
        () = cancel.cancelled() => return Ok(()),
        () = tokio::time::sleep(params.subscribe_delay) => {}
    }

    let request = SubscriptionRequest::full(params.instruments);
    write.send(request.to_message()?).await?;
    tracing::info!(
        guid = %request.guid,
        instruments = params.instruments.len(),
        "Subscription sent"
    );

    let Some(info) = next_payload(&mut read, &mut write, params.read_timeout, cancel).await? else {
        return Ok(());
    };
    let market_info = validate_market_info(&decode_frame(&info)?)?;
    tracing::info!(
        segments = market_info.segment_status.len(),
        "Market info received"
    );

    if next_payload(&mut read, &mut write, params.read_timeout, cancel)
        .await?
        .is_none()
    {
        return Ok(());
    }
    tracing::debug!("Snapshot frame discarded");

    status.set_state(ConnectionState::Streaming);

    loop {
        let Some(payload) = next_payload(&mut read, &mut write, params.read_timeout, cancel).await?
        else {
            return Ok(());
        };

        let records = decode_frame(&payload)?.into_records();
        let count = u64::try_from(records.len()).unwrap_or(u64::MAX);

        for record in records {
            tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                result = producer.put(record) => result.map_err(|_| SessionError::QueueClosed)?,
            }
        }

        status.record_frame(count);
        metrics::record_frame_received();
        metrics::record_records_received(count);
        tracing::trace!(records = count, "Frame enqueued");
    }
}

/// Read the next data frame, answering pings on the way.
///
/// Returns `Ok(None)` if cancelled.
async fn next_payload<R, W>(
    read: &mut R,
    write: &mut W,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Option<Vec<u8>>, SessionError>
where
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    W: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return Ok(None),
            next = tokio::time::timeout(read_timeout, read.next()) => next,
        };

        match next {
            Err(_) => return Err(SessionError::Transport("read timed out".to_string())),
            Ok(None) => return Err(SessionError::Transport("stream ended".to_string())),
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(Some(Ok(message))) => match message {
                Message::Binary(data) => return Ok(Some(data.to_vec())),
                Message::Text(text) => return Ok(Some(text.as_str().as_bytes().to_vec())),
                Message::Ping(data) => write.send(Message::Pong(data)).await?,
                Message::Close(frame) => {
                    tracing::info!(?frame, "Server sent close frame");
                    return Err(SessionError::Transport("closed by server".to_string()));
                }
                Message::Pong(_) | Message::Frame(_) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_wire_shape() {
        let request = SubscriptionRequest::full(&["NSE_EQ|A".to_string(), "NSE_EQ|B".to_string()]);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["method"], "sub");
        assert_eq!(value["data"]["mode"], "full");
        assert_eq!(
            value["data"]["instrumentKeys"],
            serde_json::json!(["NSE_EQ|A", "NSE_EQ|B"])
        );
        assert!(uuid::Uuid::parse_str(value["guid"].as_str().unwrap()).is_ok());
    }

    #[test]
    fn subscription_is_sent_as_binary() {
        let message = SubscriptionRequest::full(&["X".to_string()]).to_message().unwrap();
        assert!(message.is_binary());
    }

    #[test]
    fn guids_are_unique() {
        let a = SubscriptionRequest::full(&[]);
        let b = SubscriptionRequest::full(&[]);
        assert_ne!(a.guid, b.guid);
    }

    #[test]
    fn only_transport_failures_are_retryable() {
        assert!(SessionError::Transport("x".to_string()).is_transport());
        assert!(!SessionError::QueueClosed.is_transport());
        assert!(!SessionError::InvalidUri("x".to_string()).is_transport());
    }
}
