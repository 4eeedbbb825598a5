//! Market Data Feed Adapter
//!
//! Token acquisition, authorization, instrument resolution and the protobuf
//! WebSocket session that feed the ingest queue.

pub mod auth;
pub mod backoff;
pub mod codec;
pub mod connector;
pub mod instruments;
pub mod session;
pub mod status;
pub mod token;

pub use auth::{AuthorizeClient, AuthorizeError};
pub use backoff::{BackoffConfig, TokenBackoff};
pub use codec::{CodecError, FeedResponse, FeedType, MarketInfo, MarketStatus, decode_frame};
pub use connector::{FeedConnector, FeedError};
pub use instruments::{InstrumentError, resolve_instruments};
pub use session::{SessionError, SubscriptionRequest};
pub use status::{ConnectionState, FeedSnapshot, FeedStatus};
pub use token::{TokenError, TokenProvider};
