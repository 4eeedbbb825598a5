//! Configuration Module
//!
//! One immutable configuration value, built once at startup and handed to
//! each component's constructor.

mod settings;

pub use settings::{
    AccessToken, BatchSettings, ConfigError, FallbackSettings, FeedSettings, IngestConfig,
    InstrumentSource, NotificationSettings, ServerSettings, SinkSettings, TokenSource,
};
