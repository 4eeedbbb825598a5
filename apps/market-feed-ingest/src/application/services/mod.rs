//! Application Services
//!
//! The pipeline's long-running tasks.

pub mod dispatcher;
pub mod drain;
pub mod notification;
pub mod supervisor;

pub use dispatcher::{BatchDispatcher, FlushOutcome};
pub use drain::{DrainLoop, DrainReport};
pub use notification::{NotificationMonitor, PollOutcome};
pub use supervisor::{Supervisor, SupervisorError};
