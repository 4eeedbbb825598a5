//! Domain Layer - Core ingestion types with no I/O.
//!
//! Everything here is plain data plus the line-protocol rendering that turns
//! decoded feed updates into the text blob written to the sink.

/// Decoded market update records.
pub mod record;

/// Batch payload construction (sink line protocol).
pub mod batch;

/// Shared "a delivery succeeded" flag.
pub mod signal;

pub use batch::BatchPayload;
pub use record::MarketRecord;
pub use signal::SuccessSignal;
