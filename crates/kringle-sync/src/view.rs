//! Observer-side group view
//!
//! Applying an event is idempotent and, for events newer than the last
//! snapshot, order-independent: any permutation of any multiset of the
//! same deliveries leaves the view in the same state.

use std::collections::{HashMap, HashSet};

use kringle_core::{
    AssignmentMapping, EventEnvelope, EventKey, GiftIdea, Group, GroupEvent, GroupId,
    GroupSnapshot, IdeaId, KringleError, KringleResult, Participant, ParticipantId, Roster,
    ViewerContext,
};
use kringle_draw::{can_view_ideas, resolve_view, DrawView};

/// What applying one delivery did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already known by identity
    Duplicate,
    /// Already covered by the installed snapshot
    Stale,
}

/// One observer's copy of a group's roster, mapping and wish lists
#[derive(Clone, Debug)]
pub struct GroupView {
    group_id: GroupId,
    group: Option<Group>,
    participants: HashMap<ParticipantId, Participant>,
    /// Removed participants; a late insert for one of these is ignored
    tombstones: HashSet<ParticipantId>,
    mapping: Option<AssignmentMapping>,
    ideas: HashMap<IdeaId, GiftIdea>,
    seen: HashSet<EventKey>,
    /// Sequence covered by the last installed snapshot
    base_seq: u64,
    /// Highest sequence seen from either source
    high_seq: u64,
}

impl GroupView {
    pub fn new(group_id: GroupId) -> Self {
        GroupView {
            group_id,
            group: None,
            participants: HashMap::new(),
            tombstones: HashSet::new(),
            mapping: None,
            ideas: HashMap::new(),
            seen: HashSet::new(),
            base_seq: 0,
            high_seq: 0,
        }
    }

    pub fn from_snapshot(snapshot: GroupSnapshot) -> Self {
        let mut view = GroupView::new(snapshot.group.id);
        view.install_snapshot(snapshot);
        view
    }

    pub fn group_id(&self) -> GroupId {
        self.group_id
    }

    /// Group record, known once a snapshot has been installed
    pub fn group(&self) -> Option<&Group> {
        self.group.as_ref()
    }

    pub fn last_seq(&self) -> u64 {
        self.high_seq
    }

    /// Apply one delivered event.
    ///
    /// Fails with `Resync` when the event cannot be reconciled with the
    /// view (wrong group, or a second, different mapping); the caller is
    /// expected to reload from the source of truth.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> KringleResult<ApplyOutcome> {
        if envelope.group_id != self.group_id {
            return Err(KringleError::Resync(format!(
                "event for group {} delivered to view of {}",
                envelope.group_id, self.group_id
            )));
        }
        if envelope.seq <= self.base_seq {
            return Ok(ApplyOutcome::Stale);
        }

        // Every mapping shares one key, so a redelivery is only a duplicate
        // if it carries the same pairs
        if let (GroupEvent::DrawCommitted(mapping), Some(existing)) = (&envelope.event, &self.mapping) {
            if existing != mapping {
                return Err(KringleError::Resync(format!(
                    "conflicting mapping for group {}",
                    self.group_id
                )));
            }
            return Ok(ApplyOutcome::Duplicate);
        }

        let key = envelope.event.key();
        if self.seen.contains(&key) {
            return Ok(ApplyOutcome::Duplicate);
        }

        match &envelope.event {
            GroupEvent::ParticipantJoined(participant) => {
                if !self.tombstones.contains(&participant.id) {
                    self.participants
                        .entry(participant.id)
                        .or_insert_with(|| participant.clone());
                }
            }
            GroupEvent::ParticipantLeft { participant_id } => {
                self.tombstones.insert(*participant_id);
                self.participants.remove(participant_id);
                self.ideas.retain(|_, idea| idea.participant_id != *participant_id);
            }
            GroupEvent::DrawCommitted(mapping) => self.mapping = Some(mapping.clone()),
            GroupEvent::IdeaAdded(idea) => {
                if !self.tombstones.contains(&idea.participant_id) {
                    self.ideas.entry(idea.id).or_insert_with(|| idea.clone());
                }
            }
        }

        self.seen.insert(key);
        self.high_seq = self.high_seq.max(envelope.seq);
        Ok(ApplyOutcome::Applied)
    }

    /// Replace the whole view with a fetched snapshot. Deliveries at or
    /// below the snapshot's sequence are ignored from now on.
    pub fn install_snapshot(&mut self, snapshot: GroupSnapshot) {
        self.group_id = snapshot.group.id;
        self.participants = snapshot
            .participants
            .into_iter()
            .map(|p| (p.id, p))
            .collect();
        self.ideas = snapshot.ideas.into_iter().map(|i| (i.id, i)).collect();
        self.mapping = snapshot.mapping;
        self.group = Some(snapshot.group);
        self.tombstones.clear();
        self.seen.clear();
        self.base_seq = snapshot.seq;
        self.high_seq = snapshot.seq;
    }

    /// Roster in join order
    pub fn roster(&self) -> Roster {
        Roster::from_participants(self.participants.values().cloned().collect())
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Participant> {
        self.participants.get(&id)
    }

    pub fn is_drawn(&self) -> bool {
        self.mapping.is_some()
    }

    /// The draw as `viewer` is allowed to see it
    pub fn visible(&self, viewer: &ViewerContext) -> DrawView {
        resolve_view(self.mapping.as_ref(), viewer)
    }

    /// Wish list of `owner`, newest first, if `viewer` may read it
    pub fn ideas_for(&self, viewer: &ViewerContext, owner: ParticipantId) -> KringleResult<Vec<GiftIdea>> {
        if viewer.group_id != self.group_id
            || !can_view_ideas(self.mapping.as_ref(), viewer, owner)
        {
            return Err(KringleError::NotAuthorized(format!(
                "wish list of {owner} is not visible to this viewer"
            )));
        }

        let mut ideas: Vec<_> = self
            .ideas
            .values()
            .filter(|idea| idea.participant_id == owner)
            .cloned()
            .collect();
        ideas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(ideas)
    }

    /// Whether the view holds the same roster, mapping and ideas as
    /// `snapshot`
    pub fn matches(&self, snapshot: &GroupSnapshot) -> bool {
        let roster: Vec<_> = self.roster().iter().map(|p| (p.id, p.joined_seq)).collect();
        let expected: Vec<_> = snapshot
            .participants
            .iter()
            .map(|p| (p.id, p.joined_seq))
            .collect();
        if roster != expected || self.mapping != snapshot.mapping {
            return false;
        }

        let ideas: HashSet<_> = self.ideas.keys().copied().collect();
        let expected: HashSet<_> = snapshot.ideas.iter().map(|i| i.id).collect();
        ideas == expected
    }
}
