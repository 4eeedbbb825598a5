//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the feed adapter,
//! storage, and operational endpoints.

/// Configuration loaded from the environment.
pub mod config;

/// Bounded ingest queue between the feed connector and the dispatcher.
pub mod queue;

/// SQLite fallback store for undelivered batches.
pub mod fallback;

/// Market data feed: token, authorization, codec, streaming session.
pub mod feed;

/// InfluxDB sink adapter.
pub mod sink;

/// HTTP notification adapter.
pub mod notify;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Logging and OpenTelemetry tracing.
pub mod telemetry;
