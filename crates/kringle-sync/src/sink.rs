//! Notification sink interface

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::trace;

use kringle_core::{EventEnvelope, GroupId, KringleResult};
use kringle_wire::encode_event;

/// Stream of encoded event frames for one group.
///
/// A sink may attach a release hook; it runs once the receiver itself has
/// been dropped, so the sink can reclaim a channel nobody listens to.
pub struct EventStream {
    rx: Option<broadcast::Receiver<Bytes>>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl EventStream {
    pub fn new(rx: broadcast::Receiver<Bytes>) -> Self {
        EventStream {
            rx: Some(rx),
            release: None,
        }
    }

    pub fn with_release(rx: broadcast::Receiver<Bytes>, release: impl FnOnce() + Send + 'static) -> Self {
        EventStream {
            rx: Some(rx),
            release: Some(Box::new(release)),
        }
    }

    pub async fn recv(&mut self) -> Result<Bytes, RecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.recv().await,
            None => Err(RecvError::Closed),
        }
    }

    pub fn try_recv(&mut self) -> Result<Bytes, TryRecvError> {
        match self.rx.as_mut() {
            Some(rx) => rx.try_recv(),
            None => Err(TryRecvError::Closed),
        }
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        drop(self.rx.take());
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Publish/subscribe capability the service publishes through.
///
/// Frames for one group are delivered to each subscriber in publish order
/// unless the subscriber lags, in which case it is told how many it missed.
pub trait NotificationSink: Send + Sync {
    /// Publish a frame to every current subscriber of `group`. Returns the
    /// number of subscribers reached.
    fn publish(&self, group: GroupId, frame: Bytes) -> usize;

    /// Subscribe to `group`. Frames published before this call are not
    /// replayed.
    fn subscribe(&self, group: GroupId) -> EventStream;
}

/// Encode `envelope` and publish it on its group's stream
pub fn publish_event(sink: &dyn NotificationSink, envelope: &EventEnvelope) -> KringleResult<usize> {
    let frame = encode_event(envelope)?;
    let reached = sink.publish(envelope.group_id, frame);
    trace!(
        group = %envelope.group_id,
        seq = envelope.seq,
        event = ?envelope.event.event_type(),
        reached,
        "event published"
    );
    Ok(reached)
}
