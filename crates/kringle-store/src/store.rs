//! Persistence provider interface

use kringle_core::{
    AccessCode, AssignmentMapping, GiftIdea, Group, GroupId, GroupSnapshot, KringleResult,
    Participant, ParticipantId, Roster,
};

/// A record together with the group event sequence its commit was given
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Committed<T> {
    pub seq: u64,
    pub value: T,
}

/// A participant before the store admits it to a roster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewParticipant {
    pub id: ParticipantId,
    pub group_id: GroupId,
    pub name: String,
    pub contact: String,
}

/// Durable storage for groups, rosters, mappings and gift ideas.
///
/// Every mutating call is atomic per group and bumps the group's event
/// sequence. Implementations must make `insert_participant`,
/// `remove_participant` and `insert_mapping_if_absent` observe the draw
/// state in the same step as the write: a roster never changes after a
/// mapping exists, and at most one mapping is ever stored per group.
pub trait GroupStore: Send + Sync {
    /// Store a new group. Returns `false` without storing anything if its
    /// access code is already taken.
    fn insert_group(&self, group: Group) -> KringleResult<bool>;

    fn group(&self, id: GroupId) -> KringleResult<Group>;

    /// Resolve an already normalised access code
    fn group_by_code(&self, code: &AccessCode) -> KringleResult<Group>;

    /// Admit a participant. Fails with `AlreadyDrawn` once the group has a
    /// mapping, then with `DuplicateName` on an exact name clash.
    fn insert_participant(&self, participant: NewParticipant) -> KringleResult<Committed<Participant>>;

    fn participant(&self, id: ParticipantId) -> KringleResult<Participant>;

    /// Remove a participant. Fails with `AlreadyDrawn` once the group has a
    /// mapping.
    fn remove_participant(
        &self,
        group: GroupId,
        id: ParticipantId,
    ) -> KringleResult<Committed<Participant>>;

    /// Roster in join order
    fn roster(&self, group: GroupId) -> KringleResult<Roster>;

    /// Commit the group's mapping unless one already exists, in which case
    /// fail with `AlreadyDrawn` and leave the stored mapping untouched.
    fn insert_mapping_if_absent(
        &self,
        mapping: AssignmentMapping,
    ) -> KringleResult<Committed<AssignmentMapping>>;

    fn mapping(&self, group: GroupId) -> KringleResult<Option<AssignmentMapping>>;

    fn insert_idea(&self, idea: GiftIdea) -> KringleResult<Committed<GiftIdea>>;

    /// Ideas of a group, optionally of one participant, newest first
    fn ideas(&self, group: GroupId, owner: Option<ParticipantId>) -> KringleResult<Vec<GiftIdea>>;

    /// Consistent view of everything the group holds
    fn snapshot(&self, group: GroupId) -> KringleResult<GroupSnapshot>;
}
