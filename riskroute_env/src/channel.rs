//! Bounded inbound observation channel.

use crate::error::EnvError;
use crate::types::ObservationEnvelope;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};

/// A batch drained from an [`ObservationSource`] in one tick.
#[derive(Debug, Default)]
pub struct SourceBatch {
    /// Envelopes in arrival order
    pub envelopes: Vec<ObservationEnvelope>,

    /// True once every producer is gone and nothing is left to drain
    pub closed: bool,
}

/// Abstraction over the inbound side of the observation transport.
///
/// # Implementations
///
/// - **Production**: [`ObservationReceiver`] (bounded tokio channel)
/// - **Simulation**: scripted sources replaying generated observations
///
/// The fusion service calls `drain_batch` once per tick; it never blocks.
pub trait ObservationSource: Send + 'static {
    /// Takes up to `max` envelopes that are ready right now.
    fn drain_batch(&mut self, max: usize) -> SourceBatch;
}

/// Creates a bounded observation channel.
///
/// Back-pressure comes from the channel capacity: `try_send` fails with
/// [`EnvError::ChannelFull`] instead of buffering on the consumer side.
pub fn observation_channel(capacity: usize) -> (ObservationSender, ObservationReceiver) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    (
        ObservationSender { inner: tx, capacity },
        ObservationReceiver { inner: rx },
    )
}

/// Producer handle. Cheap to clone; one per upstream pipeline.
#[derive(Debug, Clone)]
pub struct ObservationSender {
    inner: mpsc::Sender<ObservationEnvelope>,
    capacity: usize,
}

impl ObservationSender {
    /// Sends an envelope, waiting for capacity.
    pub async fn send(&self, envelope: ObservationEnvelope) -> Result<(), EnvError> {
        self.inner
            .send(envelope)
            .await
            .map_err(|_| EnvError::ChannelClosed)
    }

    /// Sends an envelope without waiting.
    pub fn try_send(&self, envelope: ObservationEnvelope) -> Result<(), EnvError> {
        self.inner.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => EnvError::ChannelFull(self.capacity),
            TrySendError::Closed(_) => EnvError::ChannelClosed,
        })
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer handle owned by the fusion service.
#[derive(Debug)]
pub struct ObservationReceiver {
    inner: mpsc::Receiver<ObservationEnvelope>,
}

impl ObservationSource for ObservationReceiver {
    fn drain_batch(&mut self, max: usize) -> SourceBatch {
        let mut batch = SourceBatch::default();
        while batch.envelopes.len() < max {
            match self.inner.try_recv() {
                Ok(envelope) => batch.envelopes.push(envelope),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    batch.closed = true;
                    break;
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(n: u8) -> ObservationEnvelope {
        ObservationEnvelope::new(vec![n], n as u64, "test")
    }

    #[test]
    fn test_try_send_reports_full() {
        let (tx, _rx) = observation_channel(2);
        tx.try_send(envelope(1)).unwrap();
        tx.try_send(envelope(2)).unwrap();

        match tx.try_send(envelope(3)) {
            Err(EnvError::ChannelFull(cap)) => assert_eq!(cap, 2),
            other => panic!("expected ChannelFull, got {:?}", other),
        }
    }

    #[test]
    fn test_drain_batch_respects_max() {
        let (tx, mut rx) = observation_channel(8);
        for i in 0..5 {
            tx.try_send(envelope(i)).unwrap();
        }

        let first = rx.drain_batch(3);
        assert_eq!(first.envelopes.len(), 3);
        assert!(!first.closed);

        let second = rx.drain_batch(3);
        assert_eq!(second.envelopes.len(), 2);
        assert_eq!(second.envelopes[0].payload, vec![3]);
    }

    #[test]
    fn test_drain_reports_closed_after_senders_drop() {
        let (tx, mut rx) = observation_channel(4);
        tx.try_send(envelope(7)).unwrap();
        drop(tx);

        let batch = rx.drain_batch(10);
        assert_eq!(batch.envelopes.len(), 1);
        assert!(batch.closed);
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = observation_channel(1);
        drop(rx);
        assert!(matches!(tx.send(envelope(0)).await, Err(EnvError::ChannelClosed)));
    }
}
