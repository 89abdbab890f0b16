//! Group, participant, roster and gift idea records

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::{AccessCode, GroupId, IdeaId, KringleError, KringleResult, ParticipantId, Timestamp};

/// Contact recorded for a host who joins their own exchange
pub const HOST_CONTACT: &str = "Host";

/// A registered member of one group. Immutable once created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub group_id: GroupId,
    pub name: String,
    pub contact: String,
    /// Group event sequence at which the join was committed; defines roster order
    pub joined_seq: u64,
    pub joined_at: Timestamp,
}

impl Participant {
    pub fn new(
        id: ParticipantId,
        group_id: GroupId,
        name: impl Into<String>,
        contact: impl Into<String>,
        joined_seq: u64,
    ) -> Self {
        Participant {
            id,
            group_id,
            name: name.into(),
            contact: contact.into(),
            joined_seq,
            joined_at: Timestamp::now(),
        }
    }
}

impl PartialEq for Participant {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Participant {}

impl Hash for Participant {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A gift-exchange group. Immutable after creation; its roster and
/// mapping live alongside it in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub host_name: String,
    pub access_code: AccessCode,
    pub host_participates: bool,
    pub created_at: Timestamp,
}

/// Ordered set of participants, in join order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Roster {
    members: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Roster::default()
    }

    /// Build a roster from records in any order
    pub fn from_participants(mut members: Vec<Participant>) -> Self {
        members.sort_by_key(|p| (p.joined_seq, p.id));
        members.dedup_by_key(|p| p.id);
        Roster { members }
    }

    /// Names are compared exactly, case-sensitively
    pub fn contains_name(&self, name: &str) -> bool {
        self.members.iter().any(|p| p.name == name)
    }

    pub fn contains(&self, id: ParticipantId) -> bool {
        self.members.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: ParticipantId) -> Option<&Participant> {
        self.members.iter().find(|p| p.id == id)
    }

    /// Insert keeping join order. Fails on a name clash; inserting an id
    /// that is already present is a no-op returning `Ok(false)`.
    pub fn insert(&mut self, participant: Participant) -> KringleResult<bool> {
        if self.contains(participant.id) {
            return Ok(false);
        }
        if self.contains_name(&participant.name) {
            return Err(KringleError::DuplicateName {
                group: participant.group_id,
                name: participant.name,
            });
        }

        let pos = self
            .members
            .partition_point(|p| (p.joined_seq, p.id) < (participant.joined_seq, participant.id));
        self.members.insert(pos, participant);
        Ok(true)
    }

    pub fn remove(&mut self, id: ParticipantId) -> Option<Participant> {
        let pos = self.members.iter().position(|p| p.id == id)?;
        Some(self.members.remove(pos))
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.members.iter().map(|p| p.id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.members.iter()
    }

    pub fn as_slice(&self) -> &[Participant] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Wish-list entry published by a participant
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftIdea {
    pub id: IdeaId,
    pub participant_id: ParticipantId,
    pub group_id: GroupId,
    pub title: String,
    pub image_url: Option<String>,
    pub created_at: Timestamp,
}

/// Consistent copy of a group's state at one point of its event stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group: Group,
    /// Sequence of the last event reflected in this snapshot
    pub seq: u64,
    /// Roster in join order
    pub participants: Vec<Participant>,
    pub mapping: Option<crate::AssignmentMapping>,
    pub ideas: Vec<GiftIdea>,
}

impl GroupSnapshot {
    pub fn roster(&self) -> Roster {
        Roster::from_participants(self.participants.clone())
    }

    pub fn is_drawn(&self) -> bool {
        self.mapping.is_some()
    }
}
