//! In-process broadcast hub
//!
//! One `tokio::sync::broadcast` channel per group, created on first
//! subscription and dropped once its last stream goes away. Publishing to
//! a group nobody watches is a no-op.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

use kringle_core::GroupId;

use crate::{EventStream, NotificationSink};

/// Default per-group channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Hub configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Frames buffered per group before slow subscribers start lagging
    pub channel_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        HubConfig {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl HubConfig {
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }
}

type Channels = RwLock<HashMap<GroupId, broadcast::Sender<Bytes>>>;

/// Drop `group`'s channel if nobody is subscribed to it
fn release_idle(channels: &Channels, group: GroupId) -> bool {
    let mut channels = channels.write();
    if channels.get(&group).map_or(false, |tx| tx.receiver_count() == 0) {
        channels.remove(&group);
        debug!(group = %group, "released idle group channel");
        return true;
    }
    false
}

/// Per-group broadcast channels
pub struct BroadcastHub {
    config: HubConfig,
    channels: Arc<Channels>,
}

impl BroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        BroadcastHub {
            config,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn subscriber_count(&self, group: GroupId) -> usize {
        self.channels
            .read()
            .get(&group)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Number of groups with a live channel
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Drop channels whose subscribers have all gone away
    pub fn prune(&self) -> usize {
        let mut channels = self.channels.write();
        let before = channels.len();
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let pruned = before - channels.len();
        if pruned > 0 {
            debug!(pruned, "pruned idle group channels");
        }
        pruned
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl NotificationSink for BroadcastHub {
    fn publish(&self, group: GroupId, frame: Bytes) -> usize {
        let sent = match self.channels.read().get(&group) {
            Some(tx) => tx.send(frame),
            None => {
                trace!(group = %group, "no subscribers, frame dropped");
                return 0;
            }
        };
        match sent {
            Ok(reached) => reached,
            // Every receiver has been dropped
            Err(_) => {
                release_idle(&self.channels, group);
                0
            }
        }
    }

    fn subscribe(&self, group: GroupId) -> EventStream {
        let existing = self.channels.read().get(&group).map(|tx| tx.subscribe());
        let rx = match existing {
            Some(rx) => rx,
            None => {
                let capacity = self.config.channel_capacity.max(1);
                self.channels
                    .write()
                    .entry(group)
                    .or_insert_with(|| broadcast::channel(capacity).0)
                    .subscribe()
            }
        };

        let channels = Arc::downgrade(&self.channels);
        EventStream::with_release(rx, move || {
            if let Some(channels) = channels.upgrade() {
                release_idle(&channels, group);
            }
        })
    }
}
