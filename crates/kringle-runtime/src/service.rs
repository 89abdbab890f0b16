//! Gift-exchange service

use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{error, info, warn};

use kringle_core::{
    AccessCode, AssignmentMapping, EventEnvelope, GiftIdea, Group, GroupEvent, GroupId,
    GroupSnapshot, IdeaId, KringleError, KringleResult, Participant, ParticipantId, Roster,
    Session, Timestamp, ViewerContext, HOST_CONTACT,
};
use kringle_draw::{can_view_ideas, resolve_view, DrawEngine, DrawView};
use kringle_store::{GroupStore, MemoryStore, NewParticipant};
use kringle_sync::{
    publish_event, spawn_observer, BroadcastHub, EventStream, NotificationSink, ObserverHandle,
};

use crate::locks::GroupLocks;
use crate::{ConfigError, ServiceConfig};

/// Access codes tried before group creation gives up
pub const MAX_CODE_ATTEMPTS: u32 = 16;

/// Longest accepted name, contact, title or URL, in bytes
pub const MAX_FIELD_LEN: usize = 1024;

/// Service counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub groups_created: u64,
    pub joins: u64,
    pub leaves: u64,
    pub draws_committed: u64,
    pub draws_rejected: u64,
    pub events_published: u64,
}

/// The gift-exchange service
pub struct GiftExchange {
    config: ServiceConfig,
    store: Arc<dyn GroupStore>,
    sink: Arc<dyn NotificationSink>,
    engine: Mutex<DrawEngine>,
    rng: Mutex<StdRng>,
    locks: GroupLocks,
    stats: Mutex<ServiceStats>,
}

impl GiftExchange {
    /// In-memory store and in-process hub. Fails if `config` does not
    /// validate.
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        let store = Arc::new(MemoryStore::new());
        let hub = Arc::new(BroadcastHub::new(config.hub.clone()));
        Self::with_parts(config, store, hub)
    }

    pub fn with_parts(
        config: ServiceConfig,
        store: Arc<dyn GroupStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::assemble(config, store, sink))
    }

    fn assemble(
        config: ServiceConfig,
        store: Arc<dyn GroupStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        GiftExchange {
            engine: Mutex::new(DrawEngine::with_config(config.draw.clone())),
            rng: Mutex::new(StdRng::from_entropy()),
            config,
            store,
            sink,
            locks: GroupLocks::new(),
            stats: Mutex::new(ServiceStats::default()),
        }
    }

    /// Make draws, ids and access codes reproducible
    pub fn seeded(self, seed: u64) -> Self {
        *self.engine.lock() = DrawEngine::with_rng(
            self.config.draw.clone(),
            StdRng::seed_from_u64(seed),
        );
        *self.rng.lock() = StdRng::seed_from_u64(seed.wrapping_add(1));
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GroupStore> {
        &self.store
    }

    pub fn stats(&self) -> ServiceStats {
        self.stats.lock().clone()
    }

    /// Create a group. A participating host joins it straight away with
    /// contact `"Host"`.
    pub fn create_group(
        &self,
        name: &str,
        host_name: &str,
        host_participates: bool,
    ) -> KringleResult<(Group, Session)> {
        let name = required_text("group name", name)?;
        let host_name = required_text("host name", host_name)?;

        let group = self.insert_group_with_fresh_code(name, &host_name, host_participates)?;
        self.stats.lock().groups_created += 1;
        info!(group = %group.id, code = %group.access_code, host_participates, "group created");

        let participant_id = if host_participates {
            let host = self.join(group.id, &host_name, HOST_CONTACT)?;
            Some(host.id)
        } else {
            None
        };

        let session = Session {
            group_id: group.id,
            participant_id,
            name: host_name,
            is_host: true,
        };
        Ok((group, session))
    }

    fn insert_group_with_fresh_code(
        &self,
        name: String,
        host_name: &str,
        host_participates: bool,
    ) -> KringleResult<Group> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let group = {
                let mut rng = self.rng.lock();
                Group {
                    id: GroupId::random(&mut *rng),
                    name: name.clone(),
                    host_name: host_name.to_string(),
                    access_code: AccessCode::generate(&mut *rng),
                    host_participates,
                    created_at: Timestamp::now(),
                }
            };
            if self.store.insert_group(group.clone())? {
                return Ok(group);
            }
        }

        error!(attempts = MAX_CODE_ATTEMPTS, "no free access code");
        Err(KringleError::AccessCodeExhausted(MAX_CODE_ATTEMPTS))
    }

    /// Join the group behind an access code, as typed by the user
    pub fn join_by_code(
        &self,
        code: &str,
        name: &str,
        contact: &str,
    ) -> KringleResult<(Participant, Session)> {
        let code = AccessCode::parse(code)?;
        let group = self.store.group_by_code(&code)?;
        let participant = self.join(group.id, name, contact)?;

        let session = Session {
            group_id: group.id,
            participant_id: Some(participant.id),
            name: participant.name.clone(),
            is_host: false,
        };
        Ok((participant, session))
    }

    /// Add a participant to a group's roster.
    ///
    /// Fails with `AlreadyDrawn` once the group has been drawn, whatever
    /// the roster size, and otherwise with `DuplicateName` if the name is
    /// taken (exact, case-sensitive match).
    pub fn join(&self, group: GroupId, name: &str, contact: &str) -> KringleResult<Participant> {
        let name = required_text("name", name)?;
        let contact = bounded_text("contact", contact)?;

        let lock = self.group_lock(group)?;
        let _guard = lock.lock();

        if self.store.mapping(group)?.is_some() {
            warn!(group = %group, "join rejected, group already drawn");
            return Err(KringleError::AlreadyDrawn(group));
        }

        let id = ParticipantId::random(&mut *self.rng.lock());
        let committed = self
            .store
            .insert_participant(NewParticipant {
                id,
                group_id: group,
                name,
                contact,
            })
            .map_err(|e| {
                warn!(group = %group, error = %e, "join rejected");
                e
            })?;

        self.stats.lock().joins += 1;
        info!(group = %group, participant = %id, seq = committed.seq, "participant joined");
        self.publish(EventEnvelope::new(
            group,
            committed.seq,
            GroupEvent::ParticipantJoined(committed.value.clone()),
        ));
        Ok(committed.value)
    }

    /// Remove a participant. A participant may remove themself; a host may
    /// remove any member of their group. Not allowed once the group has
    /// been drawn.
    pub fn leave(&self, session: &Session, participant: ParticipantId) -> KringleResult<()> {
        let group = session.group_id;
        if !session.is_host && session.participant_id != Some(participant) {
            return Err(KringleError::NotAuthorized(format!(
                "only the host can remove {participant}"
            )));
        }

        let lock = self.group_lock(group)?;
        let _guard = lock.lock();

        if self.store.mapping(group)?.is_some() {
            warn!(group = %group, participant = %participant, "leave rejected, group already drawn");
            return Err(KringleError::AlreadyDrawn(group));
        }

        let committed = self.store.remove_participant(group, participant)?;
        self.stats.lock().leaves += 1;
        info!(group = %group, participant = %participant, seq = committed.seq, "participant left");
        self.publish(EventEnvelope::new(
            group,
            committed.seq,
            GroupEvent::ParticipantLeft {
                participant_id: participant,
            },
        ));
        Ok(())
    }

    /// Draw the group. Host only, and only once: every later or racing
    /// call fails with `AlreadyDrawn`. Returns the draw as the caller may
    /// see it.
    pub fn draw(&self, session: &Session) -> KringleResult<DrawView> {
        if !session.is_host {
            return Err(KringleError::NotAuthorized("only the host can draw".into()));
        }

        let group = session.group_id;
        let result = self.draw_locked(group);
        match &result {
            Ok(mapping) => {
                self.stats.lock().draws_committed += 1;
                info!(group = %group, participants = mapping.len(), "draw committed");
            }
            Err(e) => {
                self.stats.lock().draws_rejected += 1;
                if e.is_recoverable() {
                    warn!(group = %group, error = %e, "draw rejected");
                } else {
                    error!(group = %group, error = %e, "draw failed");
                }
            }
        }

        let mapping = result?;
        Ok(resolve_view(Some(&mapping), &session.viewer()))
    }

    fn draw_locked(&self, group: GroupId) -> KringleResult<AssignmentMapping> {
        let lock = self.group_lock(group)?;
        let _guard = lock.lock();

        if self.store.mapping(group)?.is_some() {
            return Err(KringleError::AlreadyDrawn(group));
        }

        let roster = self.store.roster(group)?;
        let mapping = self.engine.lock().draw(group, &roster.ids())?;

        // The store re-checks atomically; another writer sharing the store
        // but not these locks still loses here.
        let committed = self.store.insert_mapping_if_absent(mapping)?;
        self.publish(EventEnvelope::new(
            group,
            committed.seq,
            GroupEvent::DrawCommitted(committed.value.clone()),
        ));
        Ok(committed.value)
    }

    /// The draw as `viewer` may see it
    pub fn my_view(&self, viewer: &ViewerContext) -> KringleResult<DrawView> {
        let mapping = self.store.mapping(viewer.group_id)?;
        Ok(resolve_view(mapping.as_ref(), viewer))
    }

    /// Publish a wish-list entry. Allowed before and after the draw.
    pub fn add_gift_idea(
        &self,
        session: &Session,
        title: &str,
        image_url: Option<&str>,
    ) -> KringleResult<GiftIdea> {
        let Some(owner) = session.participant_id else {
            return Err(KringleError::NotAuthorized(
                "only participants have wish lists".into(),
            ));
        };
        let title = required_text("title", title)?;
        let image_url = match image_url.map(str::trim).filter(|url| !url.is_empty()) {
            Some(url) => Some(bounded_text("image url", url)?),
            None => None,
        };

        let group = session.group_id;
        let lock = self.group_lock(group)?;
        let _guard = lock.lock();

        let idea = GiftIdea {
            id: IdeaId::random(&mut *self.rng.lock()),
            participant_id: owner,
            group_id: group,
            title,
            image_url,
            created_at: Timestamp::now(),
        };
        let committed = self.store.insert_idea(idea)?;
        info!(group = %group, participant = %owner, seq = committed.seq, "gift idea added");
        self.publish(EventEnvelope::new(
            group,
            committed.seq,
            GroupEvent::IdeaAdded(committed.value.clone()),
        ));
        Ok(committed.value)
    }

    /// Wish list of `participant`, newest first. Readable by its owner, by
    /// the owner's giver once drawn, and by a host who is not taking part.
    pub fn gift_ideas(
        &self,
        viewer: &ViewerContext,
        participant: ParticipantId,
    ) -> KringleResult<Vec<GiftIdea>> {
        let owner = self.store.participant(participant)?;
        let mapping = self.store.mapping(owner.group_id)?;
        if owner.group_id != viewer.group_id
            || !can_view_ideas(mapping.as_ref(), viewer, participant)
        {
            return Err(KringleError::NotAuthorized(format!(
                "wish list of {participant} is not visible to this viewer"
            )));
        }
        self.store.ideas(owner.group_id, Some(participant))
    }

    pub fn group(&self, group: GroupId) -> KringleResult<Group> {
        self.store.group(group)
    }

    pub fn roster(&self, group: GroupId) -> KringleResult<Roster> {
        self.store.roster(group)
    }

    /// Source-of-truth state used by observers to resync
    pub fn snapshot(&self, group: GroupId) -> KringleResult<GroupSnapshot> {
        self.store.snapshot(group)
    }

    /// Raw frame stream of a group
    pub fn subscribe(&self, group: GroupId) -> EventStream {
        self.sink.subscribe(group)
    }

    /// Keep a convergent view of a group in a background task. Must be
    /// called from within a tokio runtime.
    pub fn observe(&self, group: GroupId) -> ObserverHandle {
        spawn_observer(
            self.sink.as_ref(),
            Arc::clone(&self.store),
            group,
            self.config.observer.clone(),
        )
    }

    /// Serialization lock of an existing group. Unknown ids fail before a
    /// lock entry is created for them.
    fn group_lock(&self, group: GroupId) -> KringleResult<Arc<Mutex<()>>> {
        self.store.group(group)?;
        Ok(self.locks.get(group))
    }

    /// Called with the group lock held, after the commit
    fn publish(&self, envelope: EventEnvelope) {
        match publish_event(self.sink.as_ref(), &envelope) {
            Ok(_) => self.stats.lock().events_published += 1,
            // Observers recover through resync
            Err(e) => error!(group = %envelope.group_id, seq = envelope.seq, error = %e, "failed to publish event"),
        }
    }
}

impl Default for GiftExchange {
    fn default() -> Self {
        let config = ServiceConfig::default();
        let hub = Arc::new(BroadcastHub::new(config.hub.clone()));
        Self::assemble(config, Arc::new(MemoryStore::new()), hub)
    }
}

fn bounded_text(field: &str, value: &str) -> KringleResult<String> {
    let value = value.trim();
    if value.len() > MAX_FIELD_LEN {
        return Err(KringleError::InvalidInput(format!(
            "{field} is longer than {MAX_FIELD_LEN} bytes"
        )));
    }
    Ok(value.to_string())
}

fn required_text(field: &str, value: &str) -> KringleResult<String> {
    let value = bounded_text(field, value)?;
    if value.is_empty() {
        return Err(KringleError::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value)
}
