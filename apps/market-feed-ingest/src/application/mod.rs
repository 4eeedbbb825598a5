//! Application Layer - Delivery services and port definitions.
//!
//! The services here own the long-running loops of the pipeline; they talk to
//! the outside world only through the ports.

/// Port interfaces for the sink and the notification target.
pub mod ports;

/// Dispatcher, drain loop, notification monitor and supervisor.
pub mod services;
