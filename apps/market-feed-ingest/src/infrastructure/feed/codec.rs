//! Feed Frame Codec
//!
//! Binary frames on the market data stream are protobuf `FeedResponse`
//! messages. Only the subset needed to route OHLC data is modelled here;
//! every other field is skipped by the decoder, so upstream schema additions
//! do not break decoding.
//!
//! # Session framing
//!
//! 1. `market_info` frame: segment status for every exchange segment
//! 2. `initial_feed` frame: full snapshot (discarded)
//! 3. `live_feed` frames: incremental updates

use std::collections::BTreeMap;

use prost::Message;

use crate::domain::MarketRecord;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not a valid `FeedResponse`.
    #[error("protobuf decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Frame carried a different type than the session expected.
    #[error("unexpected frame type {actual}, expected {expected:?}")]
    UnexpectedType {
        /// Expected type.
        expected: FeedType,
        /// Raw type value received.
        actual: i32,
    },

    /// Info frame carried no timestamp.
    #[error("market info frame has no currentTs")]
    MissingTimestamp,

    /// Info frame carried no segment status.
    #[error("market info frame has no segment status")]
    MissingSegmentStatus,
}

// =============================================================================
// Wire Types
// =============================================================================

/// Frame type discriminator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FeedType {
    /// Snapshot sent right after subscribing.
    InitialFeed = 0,
    /// Incremental update.
    LiveFeed = 1,
    /// Segment status, sent first on every connection.
    MarketInfo = 2,
}

/// Exchange segment status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
#[allow(missing_docs)]
pub enum MarketStatus {
    PreOpenStart = 0,
    PreOpenEnd = 1,
    NormalOpen = 2,
    NormalClose = 3,
    ClosingStart = 4,
    ClosingEnd = 5,
}

/// Top-level stream frame.
#[derive(Clone, PartialEq, Message)]
pub struct FeedResponse {
    /// Raw [`FeedType`].
    #[prost(enumeration = "FeedType", tag = "1")]
    pub r#type: i32,
    /// Per-instrument payload, keyed by instrument key.
    #[prost(btree_map = "string, message", tag = "2")]
    pub feeds: BTreeMap<String, Feed>,
    /// Server timestamp, epoch milliseconds.
    #[prost(int64, tag = "3")]
    pub current_ts: i64,
    /// Present on `market_info` frames.
    #[prost(message, optional, tag = "4")]
    pub market_info: Option<MarketInfo>,
}

/// Segment status map.
#[derive(Clone, PartialEq, Message)]
pub struct MarketInfo {
    /// Segment name → raw [`MarketStatus`].
    #[prost(btree_map = "string, enumeration(MarketStatus)", tag = "1")]
    pub segment_status: BTreeMap<String, i32>,
}

/// One instrument's payload.
#[derive(Clone, PartialEq, Message)]
pub struct Feed {
    /// Payload shape depends on the subscription mode.
    #[prost(oneof = "FeedUnion", tags = "1, 2, 3")]
    pub feed_union: Option<FeedUnion>,
}

/// Subscription-mode dependent payload.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum FeedUnion {
    /// `ltpc` mode.
    #[prost(message, tag = "1")]
    Ltpc(Ltpc),
    /// `full` mode.
    #[prost(message, tag = "2")]
    FullFeed(FullFeed),
    /// `option_greeks` mode.
    #[prost(message, tag = "3")]
    FirstLevelWithGreeks(FirstLevelWithGreeks),
}

/// Last traded price block.
#[derive(Clone, PartialEq, Message)]
pub struct Ltpc {
    /// Last traded price.
    #[prost(double, tag = "1")]
    pub ltp: f64,
    /// Last traded time.
    #[prost(int64, tag = "2")]
    pub ltt: i64,
    /// Last traded quantity.
    #[prost(int64, tag = "3")]
    pub ltq: i64,
    /// Previous close.
    #[prost(double, tag = "4")]
    pub cp: f64,
}

/// Full-mode payload: market or index.
#[derive(Clone, PartialEq, Message)]
pub struct FullFeed {
    /// Tradable instrument or index.
    #[prost(oneof = "FullFeedUnion", tags = "1, 2")]
    pub full_feed_union: Option<FullFeedUnion>,
}

/// Full-mode variants.
#[derive(Clone, PartialEq, prost::Oneof)]
pub enum FullFeedUnion {
    /// Tradable instrument.
    #[prost(message, tag = "1")]
    MarketFf(MarketFullFeed),
    /// Index.
    #[prost(message, tag = "2")]
    IndexFf(IndexFullFeed),
}

/// Full-mode payload of a tradable instrument.
#[derive(Clone, PartialEq, Message)]
pub struct MarketFullFeed {
    #[prost(message, optional, tag = "1")]
    #[allow(missing_docs)]
    pub ltpc: Option<Ltpc>,
    /// Candles per interval.
    #[prost(message, optional, tag = "4")]
    pub market_ohlc: Option<MarketOhlc>,
    /// Average traded price.
    #[prost(double, tag = "5")]
    pub atp: f64,
    /// Volume traded today.
    #[prost(int64, tag = "6")]
    pub vtt: i64,
    /// Open interest.
    #[prost(double, tag = "7")]
    pub oi: f64,
}

/// Full-mode payload of an index.
#[derive(Clone, PartialEq, Message)]
pub struct IndexFullFeed {
    #[prost(message, optional, tag = "1")]
    #[allow(missing_docs)]
    pub ltpc: Option<Ltpc>,
    /// Candles per interval.
    #[prost(message, optional, tag = "2")]
    pub market_ohlc: Option<MarketOhlc>,
}

/// Option-greeks payload; carries no candles.
#[derive(Clone, PartialEq, Message)]
pub struct FirstLevelWithGreeks {
    #[prost(message, optional, tag = "1")]
    #[allow(missing_docs)]
    pub ltpc: Option<Ltpc>,
}

/// Candle list.
#[derive(Clone, PartialEq, Message)]
pub struct MarketOhlc {
    /// One entry per interval.
    #[prost(message, repeated, tag = "1")]
    pub ohlc: Vec<Ohlc>,
}

/// One candle.
#[derive(Clone, PartialEq, Message)]
pub struct Ohlc {
    /// Interval label (`1d`, `I1`, `I30`).
    #[prost(string, tag = "1")]
    pub interval: String,
    #[prost(double, optional, tag = "2")]
    #[allow(missing_docs)]
    pub open: Option<f64>,
    #[prost(double, optional, tag = "3")]
    #[allow(missing_docs)]
    pub high: Option<f64>,
    #[prost(double, optional, tag = "4")]
    #[allow(missing_docs)]
    pub low: Option<f64>,
    #[prost(double, optional, tag = "5")]
    #[allow(missing_docs)]
    pub close: Option<f64>,
    /// Volume.
    #[prost(int64, optional, tag = "6")]
    pub vol: Option<i64>,
    /// Candle start, epoch milliseconds.
    #[prost(int64, tag = "7")]
    pub ts: i64,
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one binary frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] if the bytes are not a `FeedResponse`.
pub fn decode_frame(bytes: &[u8]) -> Result<FeedResponse, CodecError> {
    Ok(FeedResponse::decode(bytes)?)
}

/// Check that a frame is a well-formed segment status frame.
///
/// # Errors
///
/// Returns an error if the frame is of another type, has no timestamp, or
/// carries an empty segment status map.
pub fn validate_market_info(frame: &FeedResponse) -> Result<MarketInfo, CodecError> {
    if frame.r#type != FeedType::MarketInfo as i32 {
        return Err(CodecError::UnexpectedType {
            expected: FeedType::MarketInfo,
            actual: frame.r#type,
        });
    }
    if frame.current_ts == 0 {
        return Err(CodecError::MissingTimestamp);
    }
    match &frame.market_info {
        Some(info) if !info.segment_status.is_empty() => Ok(info.clone()),
        _ => Err(CodecError::MissingSegmentStatus),
    }
}

impl MarketInfo {
    /// Status of a segment, if reported and known.
    #[must_use]
    pub fn status(&self, segment: &str) -> Option<MarketStatus> {
        self.segment_status
            .get(segment)
            .and_then(|raw| MarketStatus::try_from(*raw).ok())
    }
}

impl Feed {
    fn candles(&self) -> &[Ohlc] {
        let ohlc = match &self.feed_union {
            Some(FeedUnion::FullFeed(full)) => match &full.full_feed_union {
                Some(FullFeedUnion::MarketFf(market)) => market.market_ohlc.as_ref(),
                Some(FullFeedUnion::IndexFf(index)) => index.market_ohlc.as_ref(),
                None => None,
            },
            _ => None,
        };
        ohlc.map_or(&[], |m| m.ohlc.as_slice())
    }
}

impl FeedResponse {
    /// Frame type, if known.
    #[must_use]
    pub fn frame_type(&self) -> Option<FeedType> {
        FeedType::try_from(self.r#type).ok()
    }

    /// Flatten into one record per candle of every instrument.
    ///
    /// Instruments without candle data contribute nothing.
    #[must_use]
    pub fn into_records(self) -> Vec<MarketRecord> {
        let mut records = Vec::new();
        for (feed_id, feed) in &self.feeds {
            for candle in feed.candles() {
                records.push(MarketRecord {
                    feed_id: feed_id.clone(),
                    interval: candle.interval.clone(),
                    open: candle.open,
                    high: candle.high,
                    low: candle.low,
                    close: candle.close,
                    volume: candle.vol,
                    timestamp_ms: candle.ts,
                });
            }
        }
        records
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn market_info_frame() -> FeedResponse {
        FeedResponse {
            r#type: FeedType::MarketInfo as i32,
            feeds: BTreeMap::new(),
            current_ts: 1_757_580_000_000,
            market_info: Some(MarketInfo {
                segment_status: BTreeMap::from([
                    ("NSE_EQ".to_string(), MarketStatus::NormalOpen as i32),
                    ("NSE_INDEX".to_string(), MarketStatus::NormalOpen as i32),
                ]),
            }),
        }
    }

    pub fn candle(interval: &str, ts: i64) -> Ohlc {
        Ohlc {
            interval: interval.to_string(),
            open: Some(2786.5),
            high: Some(2789.5),
            low: Some(2786.5),
            close: Some(2789.0),
            vol: Some(5848),
            ts,
        }
    }

    pub fn market_feed(candles: Vec<Ohlc>) -> Feed {
        Feed {
            feed_union: Some(FeedUnion::FullFeed(FullFeed {
                full_feed_union: Some(FullFeedUnion::MarketFf(MarketFullFeed {
                    ltpc: Some(Ltpc {
                        ltp: 2787.5,
                        ltt: 1_757_580_454_460,
                        ltq: 10,
                        cp: 2785.8,
                    }),
                    market_ohlc: Some(MarketOhlc { ohlc: candles }),
                    atp: 2784.62,
                    vtt: 118_836,
                    oi: 0.0,
                })),
            })),
        }
    }

    pub fn live_frame(feeds: Vec<(&str, Feed)>) -> FeedResponse {
        FeedResponse {
            r#type: FeedType::LiveFeed as i32,
            feeds: feeds
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            current_ts: 1_757_580_454_460,
            market_info: None,
        }
    }
}
