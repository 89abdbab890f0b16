//! Group events
//!
//! Every committed change to a group's roster, draw state or wish lists is
//! described by one event. Events are published on the group's stream in
//! commit order and applied idempotently by observers.

use serde::{Deserialize, Serialize};

use crate::{AssignmentMapping, GiftIdea, GroupId, IdeaId, Participant, ParticipantId};

/// Event type classification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    ParticipantJoined = 0x01,
    ParticipantLeft = 0x02,
    DrawCommitted = 0x10,
    IdeaAdded = 0x20,
}

impl EventType {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(EventType::ParticipantJoined),
            0x02 => Some(EventType::ParticipantLeft),
            0x10 => Some(EventType::DrawCommitted),
            0x20 => Some(EventType::IdeaAdded),
            _ => None,
        }
    }

    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A committed change
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupEvent {
    ParticipantJoined(Participant),
    ParticipantLeft { participant_id: ParticipantId },
    DrawCommitted(AssignmentMapping),
    IdeaAdded(GiftIdea),
}

/// Identity used to deduplicate deliveries
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    Joined(ParticipantId),
    Left(ParticipantId),
    Drawn(GroupId),
    Idea(IdeaId),
}

impl GroupEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            GroupEvent::ParticipantJoined(_) => EventType::ParticipantJoined,
            GroupEvent::ParticipantLeft { .. } => EventType::ParticipantLeft,
            GroupEvent::DrawCommitted(_) => EventType::DrawCommitted,
            GroupEvent::IdeaAdded(_) => EventType::IdeaAdded,
        }
    }

    pub fn key(&self) -> EventKey {
        match self {
            GroupEvent::ParticipantJoined(p) => EventKey::Joined(p.id),
            GroupEvent::ParticipantLeft { participant_id } => EventKey::Left(*participant_id),
            GroupEvent::DrawCommitted(m) => EventKey::Drawn(m.group_id),
            GroupEvent::IdeaAdded(idea) => EventKey::Idea(idea.id),
        }
    }
}

/// An event positioned in its group's stream
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub group_id: GroupId,
    /// Per-group commit sequence, starting at 1
    pub seq: u64,
    pub event: GroupEvent,
}

impl EventEnvelope {
    pub fn new(group_id: GroupId, seq: u64, event: GroupEvent) -> Self {
        EventEnvelope {
            group_id,
            seq,
            event,
        }
    }
}
