//! Event decoding and timestamp reconstruction.

use crate::definition::Value;
use crate::model::{Declaration, EventId, Timestamp};

/// A fully decoded event: its id, reconstructed timestamp (if the stream
/// carries clocks), and the decoded context/payload trees.
#[derive(Clone, Debug)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Option<Timestamp>,
    pub stream_event_context: Option<Value>,
    pub event_context: Option<Value>,
    pub payload: Option<Value>,
}

/// Extracts an event id from a decoded stream-event-header, trying in
/// order: a top-level integer field `id`; a top-level enum field `id`
/// (using its integer); an integer `id` inside a variant field named `v`
/// (already flattened transparently into the header's `v` field by the
/// codec). Absence of any of these yields event id 0.
pub fn extract_event_id(header: Option<&Value>) -> EventId {
    let Some(header) = header else {
        return 0;
    };
    if let Some(v) = header.field("id") {
        if let Some(i) = v.as_u64() {
            return i;
        }
    }
    if let Some(v) = header.field("v").and_then(|v| v.field("id")) {
        if let Some(i) = v.as_u64() {
            return i;
        }
    }
    0
}

/// Extracts a raw (possibly truncated) timestamp sample and its declared
/// bit width from a decoded stream-event-header, trying a top-level
/// integer `timestamp` and then one nested inside the `v` variant field.
/// The width comes from `header_decl` (the same header this value was
/// decoded from) since a plain [`Value`] no longer carries its source
/// field's declared size. Returns `None` if neither field is present.
pub fn extract_timestamp_sample(
    header: Option<&Value>,
    header_decl: Option<&Declaration>,
) -> Option<(u64, u32)> {
    let header = header?;
    let decl = header_decl?;
    if let Some(v) = header.field("timestamp") {
        if let Some(i) = v.as_u64() {
            let width = decl.integer_field_width("timestamp").unwrap_or(64);
            return Some((i, width));
        }
    }
    if let Some(v) = header.field("v").and_then(|v| v.field("timestamp")) {
        if let Some(i) = v.as_u64() {
            let width = decl.integer_field_width("timestamp").unwrap_or(64);
            return Some((i, width));
        }
    }
    None
}

/// Per-file-stream state tracking the 64-bit monotonic timestamp
/// reconstructed from truncated clock samples.
#[derive(Clone, Copy, Debug, Default)]
pub struct TimestampState {
    timestamp: u64,
}

impl TimestampState {
    pub fn new() -> Self {
        Self { timestamp: 0 }
    }

    pub fn current(&self) -> u64 {
        self.timestamp
    }

    /// Folds a truncated `new_low` sample of bit width `len` into the
    /// running 64-bit timestamp, assuming at most one wraparound between
    /// consecutive samples.
    ///
    /// `len` must be in `1..=64`.
    pub fn update(&mut self, new_low: u64, len: u32) -> u64 {
        debug_assert!((1..=64).contains(&len));
        if len == 64 {
            self.timestamp = new_low;
            return self.timestamp;
        }
        let mask = (1u64 << len) - 1;
        let old_low = self.timestamp & mask;
        let high = self.timestamp & !mask;
        let mut new_low = new_low & mask;
        if new_low < old_low {
            new_low = new_low.wrapping_add(1u64 << len);
        }
        self.timestamp = high.wrapping_add(new_low);
        self.timestamp
    }
}
