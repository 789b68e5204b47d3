//! Common types for the RiskRoute environment abstraction.

use serde::{Deserialize, Serialize};

/// Envelope for hazard observations arriving from upstream producers.
///
/// This is a transport-layer wrapper - the payload is opaque bytes that the
/// fusion engine decodes and validates. Delivery is at-least-once, so the same
/// payload may arrive more than once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationEnvelope {
    /// The raw observation bytes (JSON)
    pub payload: Vec<u8>,

    /// Time the envelope entered the channel (receiver's clock, unix ms)
    pub received_at_ms: u64,

    /// Name of the producing channel (e.g. "sensor-feed", "social")
    pub channel: String,
}

impl ObservationEnvelope {
    /// Creates a new envelope from payload bytes.
    pub fn new(payload: Vec<u8>, received_at_ms: u64, channel: impl Into<String>) -> Self {
        Self {
            payload,
            received_at_ms,
            channel: channel.into(),
        }
    }
}
