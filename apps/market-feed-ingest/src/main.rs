//! Market Feed Ingest Binary
//!
//! Starts the feed-to-InfluxDB ingestion pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-feed-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `INFLUX_DB_URL`, `INFLUX_DB_ORG`, `INFLUX_BUCKET_NAME`, `INFLUX_DB_TOKEN`
//! - `ACCESS_TOKEN` or `API_FETCH_TOKEN`
//! - `INSTRUMENTS_LIST` or `GET_INSTRUMENTS_URL`
//!
//! ## Optional
//! - `MAX_QUEUE_SIZE`: ingest queue capacity (default: 10000)
//! - `FEED_AUTHORIZE_URL`: feed authorization endpoint
//! - `DATA_FEED_UPDATE_URL`: notification target; monitor disabled if unset
//! - `NOTIFICATION_SLEEP_TIME` / `NOTIFICATION_WAIT_TIME`: monitor intervals (default: 60 / 50)
//! - `FALLBACK_DB_PATH`: SQLite file (default: sqlite_db/failed_to_push_data.sqlite)
//! - `INGEST_HEALTH_PORT`: health check HTTP port (default: 8083, 0 disables)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: log filter (default: market_feed_ingest=info)

use std::sync::Arc;

use anyhow::Context;
use market_feed_ingest::infrastructure::telemetry;
use market_feed_ingest::{
    BatchDispatcher, DrainLoop, FallbackStore, FeedConnector, FeedStatus, HealthServer,
    HealthServerState, HttpNotifier, IngestConfig, NotificationMonitor, Sink, SinkClient,
    SuccessSignal, Supervisor, SupervisorError, ingest_queue, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("failed to install rustls crypto provider");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Market Feed Ingest");

    let _metrics_handle = init_metrics().context("failed to install metrics recorder")?;

    let config = IngestConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    let supervisor = assemble(&config, shutdown_token.clone())?;

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        await_shutdown(signal_token).await;
    });

    supervisor.run().await.context("pipeline stopped")?;

    tracing::info!("Market Feed Ingest stopped");
    Ok(())
}

/// Build every component and hand its task to the supervisor.
fn assemble(config: &IngestConfig, cancel: CancellationToken) -> anyhow::Result<Supervisor> {
    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("failed to build HTTP client")?;

    let (producer, consumer) = ingest_queue(config.queue_capacity);
    let signal = SuccessSignal::new();
    let feed_status = Arc::new(FeedStatus::new());

    let fallback = FallbackStore::open(&config.fallback.path, config.fallback.max_rows)
        .context("failed to open fallback store")?;
    let sink: Arc<dyn Sink> = Arc::new(
        SinkClient::new(&config.sink, config.http_timeout).context("failed to build sink client")?,
    );

    let mut supervisor = Supervisor::new(cancel.clone());

    if config.server.health_port != 0 {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            Arc::clone(&feed_status),
            producer.clone(),
            signal.clone(),
        ));
        let server = HealthServer::new(config.server.health_port, state, cancel.clone());
        supervisor.spawn("health-server", async move {
            server.run().await.map_err(SupervisorError::from)
        });
    }

    let connector = FeedConnector::new(
        config.feed.clone(),
        http,
        producer,
        feed_status,
        cancel.clone(),
    );
    supervisor.spawn("feed-connector", async move {
        connector.run().await.map_err(SupervisorError::from)
    });

    let dispatcher = BatchDispatcher::new(
        consumer,
        Arc::clone(&sink),
        fallback.clone(),
        signal.clone(),
        config.batch,
        cancel.clone(),
    );
    supervisor.spawn("batch-dispatcher", async move {
        dispatcher.run().await.map_err(SupervisorError::Dispatcher)
    });

    let drain = DrainLoop::new(
        fallback,
        sink,
        signal.clone(),
        config.fallback.drain_interval,
        cancel.clone(),
    );
    supervisor.spawn("drain-loop", async move {
        drain.run().await.map_err(SupervisorError::Drain)
    });

    if let Some(url) = &config.notification.url {
        let notifier = HttpNotifier::new(url.clone(), config.http_timeout)
            .context("failed to build notifier")?;
        let monitor =
            NotificationMonitor::new(Arc::new(notifier), signal, &config.notification, cancel);
        supervisor.spawn("notification-monitor", async move {
            monitor.run().await;
            Ok(())
        });
    } else {
        tracing::info!("DATA_FEED_UPDATE_URL not set, notification monitor disabled");
    }

    Ok(supervisor)
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        queue_capacity = config.queue_capacity,
        sink_url = %config.sink.url,
        bucket = %config.sink.bucket,
        batch_size_threshold = config.batch.size_threshold,
        batch_max_age_secs = config.batch.max_age.as_secs(),
        fallback_path = %config.fallback.path.display(),
        health_port = config.server.health_port,
        notifications = config.notification.url.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        authorize_url = %config.feed.authorize_url,
        instruments = ?config.feed.instruments,
        "Feed endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT), then cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => return,
    }

    shutdown_token.cancel();
    tracing::info!("Graceful shutdown started");
}
