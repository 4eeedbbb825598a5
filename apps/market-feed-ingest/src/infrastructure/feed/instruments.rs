//! Instrument Universe Resolution
//!
//! An explicit list wins; otherwise the list is fetched from a URL returning
//! `{"instruments": [...]}`. Request and status failures are retryable. An
//! empty universe is not: the connector never subscribes to nothing.

use serde::Deserialize;

use crate::infrastructure::config::InstrumentSource;

/// Instrument resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// The instrument endpoint could not be queried.
    #[error("instrument request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The endpoint answered with a non-success status.
    #[error("instrument endpoint returned {0}")]
    Status(u16),

    /// The resolved universe is empty.
    #[error("instrument universe is empty")]
    Empty,
}

impl InstrumentError {
    /// Whether waiting and retrying can fix this.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Status(_))
    }
}

#[derive(Deserialize)]
struct InstrumentsResponse {
    instruments: Vec<String>,
}

/// Resolve the instrument keys to subscribe to.
///
/// # Errors
///
/// Returns an error if the URL cannot be queried or yields no instruments.
pub async fn resolve_instruments(
    source: &InstrumentSource,
    client: &reqwest::Client,
) -> Result<Vec<String>, InstrumentError> {
    let instruments = match source {
        InstrumentSource::List(list) => list.clone(),
        InstrumentSource::Url(url) => {
            let response = client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(InstrumentError::Status(response.status().as_u16()));
            }
            response.json::<InstrumentsResponse>().await?.instruments
        }
    };

    if instruments.is_empty() {
        return Err(InstrumentError::Empty);
    }

    tracing::info!(count = instruments.len(), "Instrument universe resolved");
    Ok(instruments)
}
