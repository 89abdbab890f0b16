//! In-memory store
//!
//! Each group lives behind its own mutex, so every operation on a group is
//! a single critical section: checking the draw state and writing happen
//! together. Index maps sit behind `RwLock`s and are always taken before a
//! group mutex.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use kringle_core::{
    AccessCode, AssignmentMapping, GiftIdea, Group, GroupId, GroupSnapshot, KringleError,
    KringleResult, Participant, ParticipantId, Roster, Timestamp,
};

use crate::{Committed, GroupStore, NewParticipant};

/// Everything one group owns
#[derive(Debug)]
struct GroupRecord {
    group: Group,
    roster: Roster,
    mapping: Option<AssignmentMapping>,
    /// Ideas with their commit sequence
    ideas: Vec<(u64, GiftIdea)>,
    seq: u64,
}

impl GroupRecord {
    fn new(group: Group) -> Self {
        GroupRecord {
            group,
            roster: Roster::new(),
            mapping: None,
            ideas: Vec::new(),
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn ensure_not_drawn(&self) -> KringleResult<()> {
        if self.mapping.is_some() {
            return Err(KringleError::AlreadyDrawn(self.group.id));
        }
        Ok(())
    }
}

/// Process-local source of truth
#[derive(Debug, Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<GroupId, Arc<Mutex<GroupRecord>>>>,
    codes: RwLock<HashMap<AccessCode, GroupId>>,
    participants: RwLock<HashMap<ParticipantId, GroupId>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Number of stored groups
    pub fn group_count(&self) -> usize {
        self.groups.read().len()
    }

    fn record(&self, id: GroupId) -> KringleResult<Arc<Mutex<GroupRecord>>> {
        self.groups
            .read()
            .get(&id)
            .cloned()
            .ok_or(KringleError::GroupNotFound(id))
    }
}

impl GroupStore for MemoryStore {
    fn insert_group(&self, group: Group) -> KringleResult<bool> {
        let mut codes = self.codes.write();
        if codes.contains_key(&group.access_code) {
            debug!(code = %group.access_code, "access code already in use");
            return Ok(false);
        }

        let mut groups = self.groups.write();
        if groups.contains_key(&group.id) {
            return Err(KringleError::InvalidInput(format!(
                "group {} already exists",
                group.id
            )));
        }

        codes.insert(group.access_code, group.id);
        groups.insert(group.id, Arc::new(Mutex::new(GroupRecord::new(group))));
        Ok(true)
    }

    fn group(&self, id: GroupId) -> KringleResult<Group> {
        Ok(self.record(id)?.lock().group.clone())
    }

    fn group_by_code(&self, code: &AccessCode) -> KringleResult<Group> {
        let id = self
            .codes
            .read()
            .get(code)
            .copied()
            .ok_or_else(|| KringleError::AccessCodeNotFound(code.to_string()))?;
        self.group(id)
    }

    fn insert_participant(&self, draft: NewParticipant) -> KringleResult<Committed<Participant>> {
        let mut index = self.participants.write();
        if index.contains_key(&draft.id) {
            return Err(KringleError::InvalidInput(format!(
                "participant {} already exists",
                draft.id
            )));
        }

        let record = self.record(draft.group_id)?;
        let mut record = record.lock();
        record.ensure_not_drawn()?;
        if record.roster.contains_name(&draft.name) {
            return Err(KringleError::DuplicateName {
                group: draft.group_id,
                name: draft.name,
            });
        }

        let seq = record.next_seq();
        let participant = Participant {
            id: draft.id,
            group_id: draft.group_id,
            name: draft.name,
            contact: draft.contact,
            joined_seq: seq,
            joined_at: Timestamp::now(),
        };
        record.roster.insert(participant.clone())?;
        index.insert(participant.id, participant.group_id);

        Ok(Committed {
            seq,
            value: participant,
        })
    }

    fn participant(&self, id: ParticipantId) -> KringleResult<Participant> {
        let group = self
            .participants
            .read()
            .get(&id)
            .copied()
            .ok_or(KringleError::ParticipantNotFound(id))?;
        let record = self.record(group)?;
        let record = record.lock();
        record
            .roster
            .get(id)
            .cloned()
            .ok_or(KringleError::ParticipantNotFound(id))
    }

    fn remove_participant(
        &self,
        group: GroupId,
        id: ParticipantId,
    ) -> KringleResult<Committed<Participant>> {
        let mut index = self.participants.write();
        let record = self.record(group)?;
        let mut record = record.lock();
        record.ensure_not_drawn()?;

        let participant = record
            .roster
            .remove(id)
            .ok_or(KringleError::ParticipantNotFound(id))?;
        record.ideas.retain(|(_, idea)| idea.participant_id != id);
        index.remove(&id);

        let seq = record.next_seq();
        Ok(Committed {
            seq,
            value: participant,
        })
    }

    fn roster(&self, group: GroupId) -> KringleResult<Roster> {
        Ok(self.record(group)?.lock().roster.clone())
    }

    fn insert_mapping_if_absent(
        &self,
        mapping: AssignmentMapping,
    ) -> KringleResult<Committed<AssignmentMapping>> {
        let record = self.record(mapping.group_id)?;
        let mut record = record.lock();
        record.ensure_not_drawn()?;

        if let Err(violation) = mapping.check_derangement(&record.roster.ids()) {
            warn!(group = %mapping.group_id, %violation, "refusing mapping that does not fit the roster");
            return Err(KringleError::InvalidInput(format!(
                "mapping does not fit the current roster: {violation}"
            )));
        }

        let seq = record.next_seq();
        record.mapping = Some(mapping.clone());
        Ok(Committed {
            seq,
            value: mapping,
        })
    }

    fn mapping(&self, group: GroupId) -> KringleResult<Option<AssignmentMapping>> {
        Ok(self.record(group)?.lock().mapping.clone())
    }

    fn insert_idea(&self, idea: GiftIdea) -> KringleResult<Committed<GiftIdea>> {
        let record = self.record(idea.group_id)?;
        let mut record = record.lock();

        if !record.roster.contains(idea.participant_id) {
            return Err(KringleError::ParticipantNotFound(idea.participant_id));
        }
        if record.ideas.iter().any(|(_, existing)| existing.id == idea.id) {
            return Err(KringleError::InvalidInput(format!(
                "gift idea {} already exists",
                idea.id
            )));
        }

        let seq = record.next_seq();
        record.ideas.push((seq, idea.clone()));
        Ok(Committed { seq, value: idea })
    }

    fn ideas(&self, group: GroupId, owner: Option<ParticipantId>) -> KringleResult<Vec<GiftIdea>> {
        let record = self.record(group)?;
        let record = record.lock();
        Ok(record
            .ideas
            .iter()
            .rev()
            .filter(|(_, idea)| owner.map_or(true, |o| idea.participant_id == o))
            .map(|(_, idea)| idea.clone())
            .collect())
    }

    fn snapshot(&self, group: GroupId) -> KringleResult<GroupSnapshot> {
        let record = self.record(group)?;
        let record = record.lock();
        Ok(GroupSnapshot {
            group: record.group.clone(),
            seq: record.seq,
            participants: record.roster.as_slice().to_vec(),
            mapping: record.mapping.clone(),
            ideas: record.ideas.iter().rev().map(|(_, idea)| idea.clone()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    use kringle_core::{Assignment, IdeaId, PairId};

    fn group(id: u64, code: &str) -> Group {
        Group {
            id: GroupId::new(id),
            name: "Oficina".into(),
            host_name: "Olga".into(),
            access_code: AccessCode::parse(code).unwrap(),
            host_participates: false,
            created_at: Timestamp::ZERO,
        }
    }

    fn draft(group: u64, id: u64, name: &str) -> NewParticipant {
        NewParticipant {
            id: ParticipantId::new(id),
            group_id: GroupId::new(group),
            name: name.into(),
            contact: format!("{name}@mail"),
        }
    }

    fn cycle(group: u64, ids: &[u64]) -> AssignmentMapping {
        let pairs = ids
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let r = ids[(i + 1) % ids.len()];
                Assignment::new(PairId::new(100 + i as u64), ParticipantId::new(*g), ParticipantId::new(r))
            })
            .collect();
        AssignmentMapping::new(GroupId::new(group), pairs, Timestamp::ZERO)
    }

    fn store_with_three() -> MemoryStore {
        let store = MemoryStore::new();
        assert!(store.insert_group(group(1, "ABC123")).unwrap());
        for (id, name) in [(1, "Ana"), (2, "Beto"), (3, "Carla")] {
            store.insert_participant(draft(1, id, name)).unwrap();
        }
        store
    }

    #[test]
    fn test_access_code_lookup_and_collision() {
        let store = MemoryStore::new();
        assert!(store.insert_group(group(1, "ABC123")).unwrap());
        assert!(!store.insert_group(group(2, "ABC123")).unwrap());
        assert_eq!(store.group_count(), 1);

        let found = store.group_by_code(&AccessCode::parse("abc123").unwrap()).unwrap();
        assert_eq!(found.id, GroupId::new(1));
        assert!(matches!(
            store.group_by_code(&AccessCode::parse("ZZZ999").unwrap()),
            Err(KringleError::AccessCodeNotFound(code)) if code == "ZZZ999"
        ));
    }

    #[test]
    fn test_sequences_follow_commit_order() {
        let store = store_with_three();
        let roster = store.roster(GroupId::new(1)).unwrap();
        let seqs: Vec<_> = roster.iter().map(|p| p.joined_seq).collect();
        assert_eq!(seqs, [1, 2, 3]);
        assert_eq!(store.snapshot(GroupId::new(1)).unwrap().seq, 3);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = store_with_three();
        let err = store.insert_participant(draft(1, 9, "Ana")).unwrap_err();
        assert!(matches!(err, KringleError::DuplicateName { ref name, .. } if name == "Ana"));
        assert_eq!(store.roster(GroupId::new(1)).unwrap().len(), 3);
        assert!(matches!(
            store.participant(ParticipantId::new(9)),
            Err(KringleError::ParticipantNotFound(_))
        ));
    }

    #[test]
    fn test_mapping_is_committed_once() {
        let store = store_with_three();
        let first = cycle(1, &[1, 2, 3]);
        store.insert_mapping_if_absent(first.clone()).unwrap();

        let second = cycle(1, &[3, 2, 1]);
        assert_eq!(
            store.insert_mapping_if_absent(second),
            Err(KringleError::AlreadyDrawn(GroupId::new(1)))
        );
        assert_eq!(store.mapping(GroupId::new(1)).unwrap(), Some(first));
    }

    #[test]
    fn test_roster_is_frozen_after_draw() {
        let store = store_with_three();
        store.insert_mapping_if_absent(cycle(1, &[1, 2, 3])).unwrap();

        assert_eq!(
            store.insert_participant(draft(1, 4, "Dani")).unwrap_err(),
            KringleError::AlreadyDrawn(GroupId::new(1))
        );
        // Even a duplicate name reports the draw first
        assert_eq!(
            store.insert_participant(draft(1, 5, "Ana")).unwrap_err(),
            KringleError::AlreadyDrawn(GroupId::new(1))
        );
        assert_eq!(
            store
                .remove_participant(GroupId::new(1), ParticipantId::new(2))
                .unwrap_err(),
            KringleError::AlreadyDrawn(GroupId::new(1))
        );
        assert_eq!(store.roster(GroupId::new(1)).unwrap().len(), 3);
    }

    #[test]
    fn test_mapping_must_fit_roster() {
        let store = store_with_three();
        let stale = cycle(1, &[1, 2]);
        assert!(matches!(
            store.insert_mapping_if_absent(stale),
            Err(KringleError::InvalidInput(_))
        ));
        assert_eq!(store.mapping(GroupId::new(1)).unwrap(), None);
    }

    #[test]
    fn test_concurrent_commits_store_exactly_one_mapping() {
        let store = Arc::new(store_with_three());
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let order = if i % 2 == 0 { [1, 2, 3] } else { [3, 2, 1] };
                    barrier.wait();
                    store.insert_mapping_if_absent(cycle(1, &order))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(KringleError::AlreadyDrawn(_)))));
    }

    #[test]
    fn test_remove_participant_drops_their_ideas() {
        let store = store_with_three();
        for (id, owner) in [(1, 1), (2, 2), (3, 2)] {
            store
                .insert_idea(GiftIdea {
                    id: IdeaId::new(id),
                    participant_id: ParticipantId::new(owner),
                    group_id: GroupId::new(1),
                    title: format!("idea {id}"),
                    image_url: None,
                    created_at: Timestamp::ZERO,
                })
                .unwrap();
        }

        let ideas = store.ideas(GroupId::new(1), Some(ParticipantId::new(2))).unwrap();
        assert_eq!(
            ideas.iter().map(|i| i.id).collect::<Vec<_>>(),
            vec![IdeaId::new(3), IdeaId::new(2)]
        );

        store
            .remove_participant(GroupId::new(1), ParticipantId::new(2))
            .unwrap();
        assert_eq!(store.ideas(GroupId::new(1), None).unwrap().len(), 1);
    }

    #[test]
    fn test_idea_requires_member() {
        let store = store_with_three();
        let idea = GiftIdea {
            id: IdeaId::new(1),
            participant_id: ParticipantId::new(42),
            group_id: GroupId::new(1),
            title: "Libro".into(),
            image_url: None,
            created_at: Timestamp::ZERO,
        };
        assert_eq!(
            store.insert_idea(idea),
            Err(KringleError::ParticipantNotFound(ParticipantId::new(42)))
        );
    }
}
