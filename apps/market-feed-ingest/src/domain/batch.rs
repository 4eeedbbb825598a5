//! Batch Payload
//!
//! Renders a flush cycle's records into the sink's line protocol:
//!
//! ```text
//! <interval>,feed_name=<feed id> Open=..,High=..,Low=..,Close=..,Volume=.. <ts_ms>
//! ```
//!
//! Only non-null, finite fields are written. Volume is written without an integer
//! suffix so it lands in the same float field as historical points.

use std::fmt::{self, Write as _};

use super::record::MarketRecord;

/// Tag key carrying the instrument identifier.
pub const FEED_TAG: &str = "feed_name";

/// An immutable, fully rendered batch of line-protocol text.
///
/// Built once per flush cycle (or rehydrated from the fallback store) and
/// never mutated afterwards; the exact bytes attempted are the bytes persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPayload {
    text: String,
    lines: usize,
}

impl BatchPayload {
    /// Render records into a payload, preserving their order.
    ///
    /// Records without a single numeric field are skipped since the sink
    /// rejects field-less points.
    #[must_use]
    pub fn from_records(records: &[MarketRecord]) -> Self {
        let mut text = String::with_capacity(records.len() * 96);
        let mut lines = 0;

        for record in records.iter().filter(|r| r.has_fields()) {
            if lines > 0 {
                text.push('\n');
            }
            write_line(&mut text, record);
            lines += 1;
        }

        Self { text, lines }
    }

    /// Wrap text previously produced by [`BatchPayload::from_records`].
    #[must_use]
    pub fn from_stored(text: String) -> Self {
        let lines = if text.is_empty() {
            0
        } else {
            text.lines().count()
        };
        Self { text, lines }
    }

    /// The payload text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of points in the payload.
    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.lines
    }

    /// Whether the payload has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines == 0
    }

    /// Payload size in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.text.len()
    }
}

impl fmt::Display for BatchPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn write_line(out: &mut String, record: &MarketRecord) {
    push_escaped(out, &record.interval, &[',', ' ']);
    out.push(',');
    out.push_str(FEED_TAG);
    out.push('=');
    push_escaped(out, &sanitize_feed_id(&record.feed_id), &[',', '=']);
    out.push(' ');

    let prices = [
        ("Open", record.open),
        ("High", record.high),
        ("Low", record.low),
        ("Close", record.close),
    ];

    let mut first = true;
    for (key, value) in prices {
        if let Some(value) = value.filter(|v| v.is_finite()) {
            push_field(out, &mut first, key, value);
        }
    }
    if let Some(volume) = record.volume {
        push_field(out, &mut first, "Volume", volume);
    }

    let _ = write!(out, " {}", record.timestamp_ms);
}

fn push_field(out: &mut String, first: &mut bool, key: &str, value: impl fmt::Display) {
    if !*first {
        out.push(',');
    }
    *first = false;
    let _ = write!(out, "{key}={value}");
}

fn push_escaped(out: &mut String, value: &str, special: &[char]) {
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Normalize an instrument identifier for use as a tag value.
#[must_use]
pub fn sanitize_feed_id(feed_id: &str) -> String {
    feed_id.replace(' ', "_")
}
