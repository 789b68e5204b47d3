//! Error types for the RiskRoute environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The bounded inbound channel is at capacity; the producer must back off.
    #[error("Observation channel full (capacity {0})")]
    ChannelFull(usize),

    /// Every receiver has been dropped.
    #[error("Observation channel closed")]
    ChannelClosed,
}
