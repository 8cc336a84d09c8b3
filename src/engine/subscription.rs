use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::warn;

use crate::event::TrackingEvent;

/// One observer's view of the events published by a tracking engine.
///
/// Every subscription receives every event published after it was created. An observer that
/// falls more than the configured event capacity behind loses the oldest events it missed and
/// continues from there.
#[derive(Debug)]
pub struct Subscription {
    receiver: broadcast::Receiver<TrackingEvent>,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<TrackingEvent>) -> Self {
        Self { receiver }
    }

    /// Wait for the next event. Returns `None` once the engine has shut down and every
    /// buffered event has been received.
    pub async fn recv(&mut self) -> Option<TrackingEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer fell behind, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<TrackingEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "Observer fell behind, events dropped");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Turn the subscription into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = TrackingEvent> {
        BroadcastStream::new(self.receiver).filter_map(|result| match result {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Observer fell behind, events dropped");
                None
            }
        })
    }
}
