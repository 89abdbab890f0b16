//! Assignment mapping
//!
//! The result of a draw: one (giver, receiver) pair per roster member,
//! forming a derangement of the roster. Created once per group, never
//! updated.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{GroupId, PairId, ParticipantId, Timestamp};

/// One giver → receiver pair
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    pub id: PairId,
    pub giver: ParticipantId,
    pub receiver: ParticipantId,
}

impl Assignment {
    pub fn new(id: PairId, giver: ParticipantId, receiver: ParticipantId) -> Self {
        Assignment { id, giver, receiver }
    }
}

/// Ways a mapping can fail to be a derangement of a roster
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DerangementViolation {
    #[error("participant {0} is assigned to themself")]
    FixedPoint(ParticipantId),

    #[error("participant {0} gives more than once")]
    RepeatedGiver(ParticipantId),

    #[error("participant {0} receives more than once")]
    RepeatedReceiver(ParticipantId),

    #[error("participant {0} is in the mapping but not the roster")]
    Stranger(ParticipantId),

    #[error("mapping has {pairs} pairs for a roster of {roster}")]
    SizeMismatch { pairs: usize, roster: usize },

    #[error("pair id {0} is used twice")]
    RepeatedPairId(PairId),
}

/// A group's committed draw result
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentMapping {
    pub group_id: GroupId,
    pub drawn_at: Timestamp,
    pairs: Vec<Assignment>,
}

impl AssignmentMapping {
    pub fn new(group_id: GroupId, pairs: Vec<Assignment>, drawn_at: Timestamp) -> Self {
        AssignmentMapping {
            group_id,
            drawn_at,
            pairs,
        }
    }

    pub fn pairs(&self) -> &[Assignment] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Who `giver` must gift
    pub fn receiver_of(&self, giver: ParticipantId) -> Option<ParticipantId> {
        self.pairs.iter().find(|a| a.giver == giver).map(|a| a.receiver)
    }

    /// Who gifts `receiver`
    pub fn giver_of(&self, receiver: ParticipantId) -> Option<ParticipantId> {
        self.pairs.iter().find(|a| a.receiver == receiver).map(|a| a.giver)
    }

    /// Whether the participant appears as giver or receiver
    pub fn involves(&self, participant: ParticipantId) -> bool {
        self.pairs
            .iter()
            .any(|a| a.giver == participant || a.receiver == participant)
    }

    /// Verify the mapping is a total derangement over `roster`: every id
    /// gives exactly once, receives exactly once, and never to themself.
    pub fn check_derangement(&self, roster: &[ParticipantId]) -> Result<(), DerangementViolation> {
        if self.pairs.len() != roster.len() {
            return Err(DerangementViolation::SizeMismatch {
                pairs: self.pairs.len(),
                roster: roster.len(),
            });
        }

        let members: HashSet<ParticipantId> = roster.iter().copied().collect();
        let mut givers = HashSet::with_capacity(roster.len());
        let mut receivers = HashSet::with_capacity(roster.len());
        let mut pair_ids = HashSet::with_capacity(roster.len());

        for pair in &self.pairs {
            if pair.giver == pair.receiver {
                return Err(DerangementViolation::FixedPoint(pair.giver));
            }
            for id in [pair.giver, pair.receiver] {
                if !members.contains(&id) {
                    return Err(DerangementViolation::Stranger(id));
                }
            }
            if !givers.insert(pair.giver) {
                return Err(DerangementViolation::RepeatedGiver(pair.giver));
            }
            if !receivers.insert(pair.receiver) {
                return Err(DerangementViolation::RepeatedReceiver(pair.receiver));
            }
            if !pair_ids.insert(pair.id) {
                return Err(DerangementViolation::RepeatedPairId(pair.id));
            }
        }

        // Equal sizes plus no repeats means both sets equal the roster
        if givers.len() != members.len() {
            return Err(DerangementViolation::SizeMismatch {
                pairs: self.pairs.len(),
                roster: members.len(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(id: u64) -> ParticipantId {
        ParticipantId::new(id)
    }

    fn mapping(pairs: &[(u64, u64)]) -> AssignmentMapping {
        let pairs = pairs
            .iter()
            .enumerate()
            .map(|(i, (g, r))| Assignment::new(PairId::new(i as u64 + 1), p(*g), p(*r)))
            .collect();
        AssignmentMapping::new(GroupId::new(9), pairs, Timestamp::ZERO)
    }

    #[test]
    fn test_cycle_is_derangement() {
        let m = mapping(&[(1, 2), (2, 3), (3, 1)]);
        assert_eq!(m.check_derangement(&[p(1), p(2), p(3)]), Ok(()));
        assert_eq!(m.receiver_of(p(2)), Some(p(3)));
        assert_eq!(m.giver_of(p(1)), Some(p(3)));
        assert!(m.involves(p(3)));
        assert!(!m.involves(p(4)));
    }

    #[test]
    fn test_detects_fixed_point() {
        let m = mapping(&[(1, 2), (2, 1), (3, 3)]);
        assert_eq!(
            m.check_derangement(&[p(1), p(2), p(3)]),
            Err(DerangementViolation::FixedPoint(p(3)))
        );
    }

    #[test]
    fn test_detects_repeated_receiver() {
        let m = mapping(&[(1, 2), (2, 3), (3, 2)]);
        assert_eq!(
            m.check_derangement(&[p(1), p(2), p(3)]),
            Err(DerangementViolation::RepeatedReceiver(p(2)))
        );
    }

    #[test]
    fn test_detects_stranger_and_size() {
        let m = mapping(&[(1, 2), (2, 4), (4, 1)]);
        assert_eq!(
            m.check_derangement(&[p(1), p(2), p(3)]),
            Err(DerangementViolation::Stranger(p(4)))
        );

        let m = mapping(&[(1, 2), (2, 1)]);
        assert!(matches!(
            m.check_derangement(&[p(1), p(2), p(3)]),
            Err(DerangementViolation::SizeMismatch { pairs: 2, roster: 3 })
        ));
    }
}
