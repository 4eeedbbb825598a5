#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::cast_possible_truncation,
        clippy::items_after_statements
    )
)]

//! Market Feed Ingest - Feed to Time-Series Pipeline
//!
//! Maintains one authorized WebSocket connection to an upstream market data
//! feed, batches the decoded OHLC updates and writes them to InfluxDB. Batches
//! the sink refuses are staged in SQLite and redelivered in the background,
//! and a downstream consumer is told whenever fresh data lands.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: `MarketRecord`, `BatchPayload` (line protocol), `SuccessSignal`
//! - **Application**: `Sink` / `Notifier` ports; dispatcher, drain loop,
//!   notification monitor, supervisor
//! - **Infrastructure**: config, ingest queue, SQLite fallback store, feed
//!   connector, InfluxDB and notification adapters, health, metrics, telemetry
//!
//! # Data Flow
//!
//! ```text
//!  Feed WS ──▶ FeedConnector ──▶ IngestQueue ──▶ BatchDispatcher ──▶ Sink
//!                                                      │  fail         ▲
//!                                                      ▼               │
//!                                               FallbackStore ◀── DrainLoop
//!
//!  BatchDispatcher / DrainLoop ──set──▶ SuccessSignal ◀──clear── NotificationMonitor
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core ingestion types with no I/O.
pub mod domain;

/// Application layer - Ports and long-running services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::{BatchPayload, MarketRecord, SuccessSignal};

// Ports and services
pub use application::ports::{Notifier, NotifyError, Sink, SinkError};
pub use application::services::{
    BatchDispatcher, DrainLoop, DrainReport, FlushOutcome, NotificationMonitor, PollOutcome,
    Supervisor, SupervisorError,
};

// Infrastructure config
pub use infrastructure::config::{
    AccessToken, BatchSettings, ConfigError, FallbackSettings, FeedSettings, IngestConfig,
    InstrumentSource, NotificationSettings, ServerSettings, SinkSettings, TokenSource,
};

// Adapters
pub use infrastructure::fallback::{FallbackError, FallbackRecord, FallbackStore, InsertOutcome};
pub use infrastructure::feed::{FeedConnector, FeedError, FeedStatus};
pub use infrastructure::notify::HttpNotifier;
pub use infrastructure::queue::{QueueConsumer, QueueProducer, ingest_queue};
pub use infrastructure::sink::SinkClient;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
