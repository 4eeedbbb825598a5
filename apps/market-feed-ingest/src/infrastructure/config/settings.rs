//! Ingest Configuration Settings
//!
//! Configuration types for the ingest pipeline, loaded from environment
//! variables. Missing sink credentials, a missing token source, or a missing
//! instrument source are fatal; malformed numeric values fall back to their
//! defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::infrastructure::fallback::{DEFAULT_FALLBACK_PATH, DEFAULT_MAX_ROWS};
use crate::infrastructure::queue::DEFAULT_QUEUE_CAPACITY;

/// Default feed authorization endpoint.
pub const DEFAULT_AUTHORIZE_URL: &str = "https://api.upstox.com/v3/feed/market-data-feed/authorize";

/// Feed access token. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wrap a token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

/// Where the feed access token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    /// A token configured up front; used as-is on every attempt.
    Static(AccessToken),
    /// An endpoint returning `{"access_token": "..."}`.
    Endpoint(String),
}

/// Where the instrument universe comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentSource {
    /// Explicit instrument keys.
    List(Vec<String>),
    /// An endpoint returning `{"instruments": [...]}`.
    Url(String),
}

/// Time-series sink connection settings.
#[derive(Clone)]
pub struct SinkSettings {
    /// Base URL, e.g. `http://localhost:8086`.
    pub url: String,
    /// Organization.
    pub org: String,
    /// Bucket.
    pub bucket: String,
    token: String,
}

impl SinkSettings {
    /// Create sink settings.
    #[must_use]
    pub fn new(
        url: impl Into<String>,
        org: impl Into<String>,
        bucket: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            org: org.into(),
            bucket: bucket.into(),
            token: token.into(),
        }
    }

    /// API token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for SinkSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkSettings")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Feed connector settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Token source.
    pub token_source: TokenSource,
    /// Feed authorization endpoint.
    pub authorize_url: String,
    /// Instrument universe source.
    pub instruments: InstrumentSource,
    /// Pause between connecting and sending the subscription.
    pub subscribe_delay: Duration,
    /// Idle read timeout on the stream.
    pub read_timeout: Duration,
    /// Transport failures tolerated per authorized session.
    pub max_transport_retries: u32,
    /// Delay between transport retries.
    pub transport_retry_delay: Duration,
    /// Delay between token fetch attempts.
    pub token_retry_delay: Duration,
    /// Delay after a generic authorization or network failure.
    pub authorize_retry_delay: Duration,
    /// First delay after an invalid-token response.
    pub invalid_token_backoff_initial: Duration,
    /// Cap on the invalid-token delay.
    pub invalid_token_backoff_max: Duration,
}

impl FeedSettings {
    /// Settings with the standard timing policy.
    #[must_use]
    pub fn new(token_source: TokenSource, instruments: InstrumentSource) -> Self {
        Self {
            token_source,
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            instruments,
            subscribe_delay: Duration::from_secs(1),
            read_timeout: Duration::from_secs(60),
            max_transport_retries: 3,
            transport_retry_delay: Duration::from_secs(2),
            token_retry_delay: Duration::from_secs(2),
            authorize_retry_delay: Duration::from_secs(10),
            invalid_token_backoff_initial: Duration::from_secs(1),
            invalid_token_backoff_max: Duration::from_secs(100),
        }
    }
}

/// Batch dispatcher trigger settings.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    /// Flush when the queue holds more than this many records.
    pub size_threshold: usize,
    /// Flush a non-empty queue once this long has passed since the last flush.
    pub max_age: Duration,
    /// Evaluation cadence.
    pub poll_interval: Duration,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            size_threshold: 10,
            max_age: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Fallback store and drain loop settings.
#[derive(Debug, Clone)]
pub struct FallbackSettings {
    /// SQLite file.
    pub path: PathBuf,
    /// Row cap.
    pub max_rows: u64,
    /// Drain loop cadence.
    pub drain_interval: Duration,
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_FALLBACK_PATH),
            max_rows: DEFAULT_MAX_ROWS,
            drain_interval: Duration::from_secs(10),
        }
    }
}

/// Notification monitor settings.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    /// Notification target; the monitor is disabled when absent.
    pub url: Option<String>,
    /// Default poll interval, restored after a successful notification.
    pub default_interval: Duration,
    /// Shortened interval used after a failed or idle cycle.
    pub short_interval: Duration,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            url: None,
            default_interval: Duration::from_secs(60),
            short_interval: Duration::from_secs(50),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, Copy)]
pub struct ServerSettings {
    /// Health and metrics HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete ingest configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Ingest queue capacity.
    pub queue_capacity: usize,
    /// Per-request timeout for every HTTP call.
    pub http_timeout: Duration,
    /// Sink settings.
    pub sink: SinkSettings,
    /// Feed connector settings.
    pub feed: FeedSettings,
    /// Dispatcher settings.
    pub batch: BatchSettings,
    /// Fallback settings.
    pub fallback: FallbackSettings,
    /// Notification settings.
    pub notification: NotificationSettings,
    /// Server settings.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required key is missing or empty.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);

        let sink = SinkSettings::new(
            env.required("INFLUX_DB_URL")?,
            env.required("INFLUX_DB_ORG")?,
            env.required("INFLUX_BUCKET_NAME")?,
            env.required("INFLUX_DB_TOKEN")?,
        );

        let token_source = match (env.optional("ACCESS_TOKEN"), env.optional("API_FETCH_TOKEN")) {
            (Some(token), _) => TokenSource::Static(AccessToken::new(token)),
            (None, Some(url)) => TokenSource::Endpoint(url),
            (None, None) => return Err(ConfigError::MissingTokenSource),
        };

        let instrument_list: Vec<String> = env
            .optional("INSTRUMENTS_LIST")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let instruments = if !instrument_list.is_empty() {
            InstrumentSource::List(instrument_list)
        } else if let Some(url) = env.optional("GET_INSTRUMENTS_URL") {
            InstrumentSource::Url(url)
        } else {
            return Err(ConfigError::MissingInstrumentSource);
        };

        let mut feed = FeedSettings::new(token_source, instruments);
        if let Some(url) = env.optional("FEED_AUTHORIZE_URL") {
            feed.authorize_url = url;
        }
        feed.read_timeout = env.secs("FEED_READ_TIMEOUT_SECS", feed.read_timeout);

        let batch = BatchSettings {
            size_threshold: env.parsed("BATCH_SIZE_THRESHOLD", BatchSettings::default().size_threshold),
            max_age: env.secs("BATCH_MAX_AGE_SECS", BatchSettings::default().max_age),
            poll_interval: env.secs(
                "BATCH_POLL_INTERVAL_SECS",
                BatchSettings::default().poll_interval,
            ),
        };

        let fallback = FallbackSettings {
            path: env
                .optional("FALLBACK_DB_PATH")
                .map_or_else(|| FallbackSettings::default().path, PathBuf::from),
            max_rows: env.parsed("FALLBACK_MAX_ROWS", FallbackSettings::default().max_rows),
            drain_interval: env.secs(
                "DRAIN_INTERVAL_SECS",
                FallbackSettings::default().drain_interval,
            ),
        };

        let notification = NotificationSettings {
            url: env.optional("DATA_FEED_UPDATE_URL"),
            default_interval: env.secs(
                "NOTIFICATION_SLEEP_TIME",
                NotificationSettings::default().default_interval,
            ),
            short_interval: env.secs(
                "NOTIFICATION_WAIT_TIME",
                NotificationSettings::default().short_interval,
            ),
        };

        let server = ServerSettings {
            health_port: env.parsed("INGEST_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            queue_capacity: env.parsed("MAX_QUEUE_SIZE", DEFAULT_QUEUE_CAPACITY),
            http_timeout: env.secs("HTTP_TIMEOUT_SECS", Duration::from_secs(30)),
            sink,
            feed,
            batch,
            fallback,
            notification,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Neither a static token nor a token endpoint is configured.
    #[error("neither ACCESS_TOKEN nor API_FETCH_TOKEN is set")]
    MissingTokenSource,
    /// Neither an instrument list nor an instrument URL is configured.
    #[error("neither INSTRUMENTS_LIST nor GET_INSTRUMENTS_URL is set")]
    MissingInstrumentSource,
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        match (self.0)(key) {
            None => Err(ConfigError::MissingEnvVar(key.to_string())),
            Some(v) if v.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
            Some(v) => Ok(v),
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        (self.0)(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }
}
