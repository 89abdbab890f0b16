//! Observer task
//!
//! Keeps a `GroupView` in step with a group's stream. The stream is
//! subscribed before the first snapshot is fetched, so nothing committed
//! after the snapshot can be missed; anything the snapshot already covers
//! is discarded by sequence.
//!
//! The view is reloaded from the source of truth when:
//! - the subscriber lagged and frames were dropped
//! - nothing arrived within `recv_timeout`
//! - a frame failed to decode, or could not be reconciled with the view

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use kringle_core::{
    GiftIdea, GroupId, GroupSnapshot, KringleError, KringleResult, ParticipantId, Roster,
    ViewerContext,
};
use kringle_draw::DrawView;
use kringle_store::GroupStore;
use kringle_wire::decode_event;

use crate::{ApplyOutcome, EventStream, GroupView, NotificationSink};

/// Where an observer reloads from
pub trait SnapshotSource: Send + Sync {
    fn fetch_snapshot(&self, group: GroupId) -> KringleResult<GroupSnapshot>;
}

impl<S: GroupStore + ?Sized> SnapshotSource for S {
    fn fetch_snapshot(&self, group: GroupId) -> KringleResult<GroupSnapshot> {
        self.snapshot(group)
    }
}

/// Observer configuration
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Silence after which the view is reloaded
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub recv_timeout: Duration,
    /// Consecutive failed reloads before the observer gives up
    pub max_resync_failures: u32,
    /// Pause between failed reloads
    #[serde(deserialize_with = "crate::duration::deserialize")]
    pub resync_backoff: Duration,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            recv_timeout: Duration::from_secs(30),
            max_resync_failures: 5,
            resync_backoff: Duration::from_millis(200),
        }
    }
}

impl ObserverConfig {
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        self.recv_timeout = timeout;
        self
    }

    pub fn with_max_resync_failures(mut self, failures: u32) -> Self {
        self.max_resync_failures = failures;
        self
    }

    pub fn with_resync_backoff(mut self, backoff: Duration) -> Self {
        self.resync_backoff = backoff;
        self
    }
}

/// Observer statistics
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObserverStats {
    /// Deliveries that changed the view
    pub applied: u64,
    /// Deliveries already known or already covered by a snapshot
    pub duplicates: u64,
    /// Snapshot installs, the initial one included
    pub resyncs: u64,
    pub decode_failures: u64,
}

struct Observer<S: ?Sized> {
    group_id: GroupId,
    stream: EventStream,
    source: Arc<S>,
    config: ObserverConfig,
    view: Arc<RwLock<GroupView>>,
    stats: Arc<Mutex<ObserverStats>>,
    progress: watch::Sender<Option<u64>>,
}

impl<S: SnapshotSource + ?Sized> Observer<S> {
    async fn run(mut self) -> KringleResult<()> {
        let mut needs_resync = true;
        let mut failures = 0u32;

        loop {
            if needs_resync {
                match self.resync() {
                    Ok(()) => failures = 0,
                    Err(e) => {
                        failures += 1;
                        if failures >= self.config.max_resync_failures.max(1) {
                            error!(group = %self.group_id, failures, error = %e, "giving up on resync");
                            return Err(KringleError::Resync(format!(
                                "group {} could not be reloaded after {failures} attempts: {e}",
                                self.group_id
                            )));
                        }
                        warn!(group = %self.group_id, failures, error = %e, "resync failed, retrying");
                        tokio::time::sleep(self.config.resync_backoff).await;
                        continue;
                    }
                }
            }

            needs_resync = match tokio::time::timeout(self.config.recv_timeout, self.stream.recv()).await {
                Ok(Ok(frame)) => !self.handle_frame(&frame),
                Ok(Err(RecvError::Lagged(missed))) => {
                    warn!(group = %self.group_id, missed, "observer lagged behind its stream");
                    true
                }
                Ok(Err(RecvError::Closed)) => {
                    info!(group = %self.group_id, "group stream closed");
                    return Ok(());
                }
                Err(_) => {
                    debug!(group = %self.group_id, "no delivery within timeout");
                    true
                }
            };
        }
    }

    /// Returns false if the view needs reloading
    fn handle_frame(&mut self, frame: &Bytes) -> bool {
        let envelope = match decode_event(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.lock().decode_failures += 1;
                warn!(group = %self.group_id, error = %e, "undecodable frame");
                return false;
            }
        };

        let outcome = self.view.write().apply(&envelope);
        match outcome {
            Ok(ApplyOutcome::Applied) => {
                self.stats.lock().applied += 1;
                let seq = self.view.read().last_seq();
                self.progress.send_replace(Some(seq));
                true
            }
            Ok(ApplyOutcome::Duplicate | ApplyOutcome::Stale) => {
                self.stats.lock().duplicates += 1;
                true
            }
            Err(e) => {
                warn!(group = %self.group_id, seq = envelope.seq, error = %e, "delivery rejected by view");
                false
            }
        }
    }

    fn resync(&mut self) -> KringleResult<()> {
        let snapshot = self.source.fetch_snapshot(self.group_id)?;
        if snapshot.group.id != self.group_id {
            return Err(KringleError::Resync(format!(
                "snapshot of group {} returned for {}",
                snapshot.group.id, self.group_id
            )));
        }

        let seq = snapshot.seq;
        self.view.write().install_snapshot(snapshot);
        self.stats.lock().resyncs += 1;
        self.progress.send_replace(Some(seq));
        debug!(group = %self.group_id, seq, "view reloaded");
        Ok(())
    }
}

/// Handle to a running observer. Dropping it unsubscribes.
pub struct ObserverHandle {
    group_id: GroupId,
    view: Arc<RwLock<GroupView>>,
    stats: Arc<Mutex<ObserverStats>>,
    progress: watch::Receiver<Option<u64>>,
    task: Option<JoinHandle<KringleResult<()>>>,
}

impl ObserverHandle {
    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Read access to the current view
    pub fn view(&self) -> RwLockReadGuard<'_, GroupView> {
        self.view.read()
    }

    pub fn roster(&self) -> Roster {
        self.view.read().roster()
    }

    pub fn visible(&self, viewer: &ViewerContext) -> DrawView {
        self.view.read().visible(viewer)
    }

    pub fn ideas_for(&self, viewer: &ViewerContext, owner: ParticipantId) -> KringleResult<Vec<GiftIdea>> {
        self.view.read().ideas_for(viewer, owner)
    }

    pub fn stats(&self) -> ObserverStats {
        *self.stats.lock()
    }

    /// Wait until the view reflects at least `seq`. Returns false on
    /// timeout or if the observer stopped first.
    pub async fn wait_for_seq(&mut self, seq: u64, within: Duration) -> bool {
        let reached = self.progress.wait_for(|s| s.map_or(false, |s| s >= seq));
        matches!(tokio::time::timeout(within, reached).await, Ok(Ok(_)))
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Stop observing
    pub fn unsubscribe(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Wait for the observer to stop on its own: stream closed, or resync
    /// abandoned
    pub async fn join(mut self) -> KringleResult<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(KringleError::Resync(format!("observer task failed: {e}"))),
        }
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Subscribe to `group` on `sink` and keep a view of it in a background
/// task. Must be called from within a tokio runtime.
pub fn spawn_observer<S>(
    sink: &dyn NotificationSink,
    source: Arc<S>,
    group_id: GroupId,
    config: ObserverConfig,
) -> ObserverHandle
where
    S: SnapshotSource + ?Sized + 'static,
{
    let stream = sink.subscribe(group_id);
    let view = Arc::new(RwLock::new(GroupView::new(group_id)));
    let stats = Arc::new(Mutex::new(ObserverStats::default()));
    let (progress, progress_rx) = watch::channel(None);

    let observer = Observer {
        group_id,
        stream,
        source,
        config,
        view: Arc::clone(&view),
        stats: Arc::clone(&stats),
        progress,
    };
    let task = tokio::spawn(observer.run());

    ObserverHandle {
        group_id,
        view,
        stats,
        progress: progress_rx,
        task: Some(task),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{publish_event, BroadcastHub, HubConfig};
    use kringle_core::{AccessCode, EventEnvelope, Group, GroupEvent, Timestamp};
    use kringle_store::{MemoryStore, NewParticipant};

    const GROUP: GroupId = GroupId(1);
    const WAIT: Duration = Duration::from_secs(2);

    fn store() -> Arc<MemoryStore> {
        let store = MemoryStore::new();
        store
            .insert_group(Group {
                id: GROUP,
                name: "Equipo".into(),
                host_name: "Olga".into(),
                access_code: AccessCode::parse("EQP001").unwrap(),
                host_participates: false,
                created_at: Timestamp::ZERO,
            })
            .unwrap();
        Arc::new(store)
    }

    /// Commit a join and return its event
    fn join(store: &MemoryStore, id: u64, name: &str) -> EventEnvelope {
        let committed = store
            .insert_participant(NewParticipant {
                id: ParticipantId::new(id),
                group_id: GROUP,
                name: name.into(),
                contact: String::new(),
            })
            .unwrap();
        EventEnvelope::new(GROUP, committed.seq, GroupEvent::ParticipantJoined(committed.value))
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        check()
    }

    #[tokio::test]
    async fn test_live_events_converge() {
        let hub = BroadcastHub::default();
        let store = store();
        let mut observer = spawn_observer(&hub, Arc::clone(&store), GROUP, ObserverConfig::default());
        assert!(observer.wait_for_seq(0, WAIT).await);

        for (id, name) in [(1, "Ana"), (2, "Beto"), (3, "Carla")] {
            let event = join(&store, id, name);
            publish_event(&hub, &event).unwrap();
        }

        assert!(observer.wait_for_seq(3, WAIT).await);
        assert!(observer.view().matches(&store.snapshot(GROUP).unwrap()));
        assert_eq!(observer.stats().applied, 3);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_counted_not_applied() {
        let hub = BroadcastHub::default();
        let store = store();
        let mut observer = spawn_observer(&hub, Arc::clone(&store), GROUP, ObserverConfig::default());
        assert!(observer.wait_for_seq(0, WAIT).await);

        let event = join(&store, 1, "Ana");
        publish_event(&hub, &event).unwrap();
        publish_event(&hub, &event).unwrap();
        let marker = join(&store, 2, "Beto");
        publish_event(&hub, &marker).unwrap();

        assert!(observer.wait_for_seq(2, WAIT).await);
        assert!(eventually(|| observer.stats().duplicates == 1).await);
        assert_eq!(observer.roster().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_frame_triggers_resync() {
        let hub = BroadcastHub::default();
        let store = store();
        let mut observer = spawn_observer(&hub, Arc::clone(&store), GROUP, ObserverConfig::default());
        assert!(observer.wait_for_seq(0, WAIT).await);

        // Committed but only announced through a garbled frame
        join(&store, 1, "Ana");
        hub.publish(GROUP, Bytes::from_static(b"\x01garbage"));

        assert!(observer.wait_for_seq(1, WAIT).await);
        let stats = observer.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.resyncs, 2);
        assert_eq!(observer.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_lagging_observer_reloads() {
        let hub = BroadcastHub::new(HubConfig::default().with_channel_capacity(2));
        let store = store();
        let mut observer = spawn_observer(&hub, Arc::clone(&store), GROUP, ObserverConfig::default());

        // The observer task has not run yet on this single-threaded runtime
        for i in 1..=6 {
            let event = join(&store, i, &format!("P{i}"));
            publish_event(&hub, &event).unwrap();
        }

        assert!(observer.wait_for_seq(6, WAIT).await);
        assert!(eventually(|| observer.stats().resyncs >= 2).await);
        assert!(observer.view().matches(&store.snapshot(GROUP).unwrap()));
    }

    #[tokio::test]
    async fn test_silence_triggers_resync() {
        let hub = BroadcastHub::default();
        let store = store();
        let config = ObserverConfig::default().with_recv_timeout(Duration::from_millis(50));
        let mut observer = spawn_observer(&hub, Arc::clone(&store), GROUP, config);
        assert!(observer.wait_for_seq(0, WAIT).await);

        // Never published
        join(&store, 1, "Ana");
        assert!(observer.wait_for_seq(1, WAIT).await);
        assert_eq!(observer.roster().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_repeated_resync_failures() {
        let hub = BroadcastHub::default();
        let store = store();
        let config = ObserverConfig::default()
            .with_max_resync_failures(3)
            .with_resync_backoff(Duration::from_millis(1));
        let observer = spawn_observer(&hub, store, GroupId::new(99), config);

        assert!(matches!(observer.join().await, Err(KringleError::Resync(_))));
    }

    #[tokio::test]
    async fn test_closed_stream_ends_observer() {
        let hub = BroadcastHub::default();
        let mut observer = spawn_observer(&hub, store(), GROUP, ObserverConfig::default());
        assert!(observer.wait_for_seq(0, WAIT).await);

        drop(hub);
        assert_eq!(observer.join().await, Ok(()));
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let hub = BroadcastHub::default();
        let mut observer = spawn_observer(&hub, store(), GROUP, ObserverConfig::default());
        assert!(observer.wait_for_seq(0, WAIT).await);
        assert_eq!(hub.subscriber_count(GROUP), 1);

        drop(observer);
        assert!(eventually(|| hub.subscriber_count(GROUP) == 0).await);
    }

    #[tokio::test]
    async fn test_dropped_observers_release_their_channels() {
        let hub = BroadcastHub::default();
        let store = store();
        let observers: Vec<_> = (0..50)
            .map(|n| {
                spawn_observer(&hub, Arc::clone(&store), GroupId::new(100 + n), ObserverConfig::default())
            })
            .collect();
        assert_eq!(hub.channel_count(), 50);

        drop(observers);
        assert!(eventually(|| hub.channel_count() == 0).await);
    }

    #[test]
    fn test_config_from_json() {
        let config: ObserverConfig =
            serde_json::from_str(r#"{"recv_timeout":"5s","max_resync_failures":2}"#).unwrap();
        assert_eq!(config.recv_timeout, Duration::from_secs(5));
        assert_eq!(config.max_resync_failures, 2);
        assert_eq!(config.resync_backoff, ObserverConfig::default().resync_backoff);
    }
}
