//! Ordered event delivery from external providers.

use async_trait::async_trait;
use crate::error::EnvError;
use tokio::sync::{mpsc, Mutex};

/// An asynchronous, ordered source of events.
///
/// # Implementations
///
/// - **Production**: an adapter over the platform's recognition/session feed
/// - **Simulation/tests**: [`ChannelStream`], fed by an [`EventSink`]
///
/// # Ordering
///
/// Events are yielded strictly in the order they were produced. Consumers
/// process one event at a time; this is the only ordering guarantee the
/// anchor lifecycle relies on.
#[async_trait]
pub trait EventStream<T: Send + 'static>: Send + Sync + 'static {
    /// Receives the next event.
    ///
    /// # Returns
    /// * `Some(event)` - the next event in arrival order
    /// * `None` - the source has shut down
    async fn recv(&self) -> Option<T>;
}

/// Producer half of a channel-backed event stream.
#[derive(Debug)]
pub struct EventSink<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for EventSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSink<T> {
    /// Queues an event for delivery.
    pub fn send(&self, event: T) -> Result<(), EnvError> {
        self.tx
            .send(event)
            .map_err(|_| EnvError::closed("event stream receiver dropped"))
    }
}

/// Consumer half of a channel-backed event stream.
pub struct ChannelStream<T> {
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

#[async_trait]
impl<T: Send + 'static> EventStream<T> for ChannelStream<T> {
    async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }
}

/// Creates a connected sink/stream pair.
pub fn event_channel<T>() -> (EventSink<T>, ChannelStream<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx }, ChannelStream { rx: Mutex::new(rx) })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (sink, stream) = event_channel();
        for i in 0..5 {
            sink.send(i).unwrap();
        }
        drop(sink);

        let mut seen = Vec::new();
        while let Some(v) = stream.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (sink, stream) = event_channel::<u8>();
        drop(stream);
        assert!(matches!(sink.send(1), Err(EnvError::ChannelClosed(_))));
    }
}
