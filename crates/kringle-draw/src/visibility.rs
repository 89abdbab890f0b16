//! Visibility resolver
//!
//! Decides which pairs of a group's mapping a viewer may see:
//! 1. A host who is not in the mapping sees every pair.
//! 2. Anyone else, including a host who takes part in the exchange, sees
//!    only the pair where they are the giver.
//! 3. A viewer with no pair sees nothing, which is not the same as the
//!    group not having been drawn yet.
//!
//! Privacy follows participation, not the host flag.

use kringle_core::{Assignment, AssignmentMapping, ParticipantId, ViewerContext};

/// How a viewer relates to a group's exchange
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerRole {
    /// Host who organizes without taking part
    Organizer,
    /// Host who is also giving and receiving
    ParticipatingHost,
    Participant,
}

impl ViewerRole {
    /// Classify a viewer. Once a mapping exists, a host participates iff
    /// their id appears in it as giver or receiver; before the draw, a host
    /// participates iff they hold a participant id.
    pub fn classify(mapping: Option<&AssignmentMapping>, viewer: &ViewerContext) -> Self {
        if !viewer.is_host {
            return ViewerRole::Participant;
        }

        let participates = match (mapping, viewer.participant_id) {
            (_, None) => false,
            (Some(mapping), Some(id)) => mapping.involves(id),
            (None, Some(_)) => true,
        };

        if participates {
            ViewerRole::ParticipatingHost
        } else {
            ViewerRole::Organizer
        }
    }

    pub fn sees_everything(self) -> bool {
        self == ViewerRole::Organizer
    }
}

/// The part of a mapping one viewer is allowed to see
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisibleSlice {
    pub role: ViewerRole,
    pub pairs: Vec<Assignment>,
}

impl VisibleSlice {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// The viewer's own receiver, for non-organizer views
    pub fn own_receiver(&self) -> Option<ParticipantId> {
        if self.role.sees_everything() {
            return None;
        }
        self.pairs.first().map(|a| a.receiver)
    }
}

/// Draw state as one viewer sees it
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawView {
    NotDrawn,
    Drawn(VisibleSlice),
}

impl DrawView {
    pub fn is_drawn(&self) -> bool {
        matches!(self, DrawView::Drawn(_))
    }

    pub fn slice(&self) -> Option<&VisibleSlice> {
        match self {
            DrawView::NotDrawn => None,
            DrawView::Drawn(slice) => Some(slice),
        }
    }
}

/// Filter `mapping` down to what `viewer` may see. Never fails; a viewer
/// from another group sees nothing.
pub fn visible_slice(mapping: &AssignmentMapping, viewer: &ViewerContext) -> VisibleSlice {
    let role = ViewerRole::classify(Some(mapping), viewer);

    if viewer.group_id != mapping.group_id {
        return VisibleSlice {
            role,
            pairs: Vec::new(),
        };
    }

    let pairs = match (role, viewer.participant_id) {
        (ViewerRole::Organizer, _) => mapping.pairs().to_vec(),
        (_, Some(me)) => mapping
            .pairs()
            .iter()
            .filter(|a| a.giver == me)
            .copied()
            .collect(),
        (_, None) => Vec::new(),
    };

    VisibleSlice { role, pairs }
}

/// Resolve the draw state for a viewer, keeping "not drawn yet" distinct
/// from "drawn, but nothing for you"
pub fn resolve_view(mapping: Option<&AssignmentMapping>, viewer: &ViewerContext) -> DrawView {
    match mapping {
        None => DrawView::NotDrawn,
        Some(mapping) => DrawView::Drawn(visible_slice(mapping, viewer)),
    }
}

/// Whether `viewer` may read the wish list of `owner`: the owner
/// themself, the owner's assigned giver, or an organizer. The caller
/// checks that `owner` belongs to the viewer's group.
pub fn can_view_ideas(
    mapping: Option<&AssignmentMapping>,
    viewer: &ViewerContext,
    owner: ParticipantId,
) -> bool {
    if viewer.participant_id == Some(owner) {
        return true;
    }
    if ViewerRole::classify(mapping, viewer).sees_everything() {
        return true;
    }
    match (mapping, viewer.participant_id) {
        (Some(mapping), Some(me)) => {
            mapping.group_id == viewer.group_id && mapping.giver_of(owner) == Some(me)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kringle_core::{GroupId, PairId, Timestamp};

    const GROUP: GroupId = GroupId(1);
    const A: ParticipantId = ParticipantId(0xA);
    const B: ParticipantId = ParticipantId(0xB);
    const C: ParticipantId = ParticipantId(0xC);
    const HOST: ParticipantId = ParticipantId(0xF);

    fn pair(id: u64, giver: ParticipantId, receiver: ParticipantId) -> Assignment {
        Assignment::new(PairId::new(id), giver, receiver)
    }

    /// {A→B, B→C, C→A}
    fn cycle() -> AssignmentMapping {
        AssignmentMapping::new(
            GROUP,
            vec![pair(1, A, B), pair(2, B, C), pair(3, C, A)],
            Timestamp::ZERO,
        )
    }

    #[test]
    fn test_non_participating_host_sees_everything() {
        let mapping = cycle();
        for viewer in [
            ViewerContext::host(GROUP, None),
            // Host id that is not in the mapping
            ViewerContext::host(GROUP, Some(HOST)),
        ] {
            let slice = visible_slice(&mapping, &viewer);
            assert_eq!(slice.role, ViewerRole::Organizer);
            assert_eq!(slice.pairs, mapping.pairs());
            assert_eq!(slice.own_receiver(), None);
        }
    }

    #[test]
    fn test_participating_host_sees_only_own_pair() {
        let slice = visible_slice(&cycle(), &ViewerContext::host(GROUP, Some(A)));
        assert_eq!(slice.role, ViewerRole::ParticipatingHost);
        assert_eq!(slice.pairs, vec![pair(1, A, B)]);
        assert_eq!(slice.own_receiver(), Some(B));
    }

    #[test]
    fn test_participating_host_as_receiver_only_is_still_restricted() {
        // Host appears only as a receiver: still a participant, so no
        // organizer view, and no giver pair of their own.
        let mapping = AssignmentMapping::new(
            GROUP,
            vec![pair(1, B, HOST), pair(2, C, B)],
            Timestamp::ZERO,
        );
        let slice = visible_slice(&mapping, &ViewerContext::host(GROUP, Some(HOST)));
        assert_eq!(slice.role, ViewerRole::ParticipatingHost);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_plain_participant_sees_only_own_pair() {
        let mapping = cycle();
        let slice = visible_slice(&mapping, &ViewerContext::participant(GROUP, B));
        assert_eq!(slice.role, ViewerRole::Participant);
        assert_eq!(slice.pairs, vec![pair(2, B, C)]);
        assert!(!slice.pairs.contains(&pair(1, A, B)));
        assert!(!slice.pairs.contains(&pair(3, C, A)));
    }

    #[test]
    fn test_every_participant_sees_exactly_one_pair_they_give() {
        let mapping = cycle();
        for me in [A, B, C] {
            for is_host in [false, true] {
                let viewer = ViewerContext {
                    participant_id: Some(me),
                    group_id: GROUP,
                    is_host,
                };
                let slice = visible_slice(&mapping, &viewer);
                assert_eq!(slice.pairs.len(), 1);
                assert_eq!(slice.pairs[0].giver, me);
                assert!(!slice.role.sees_everything());
            }
        }
    }

    #[test]
    fn test_stranger_gets_empty_slice_not_error() {
        let slice = visible_slice(&cycle(), &ViewerContext::participant(GROUP, ParticipantId::new(0x99)));
        assert!(slice.is_empty());
        assert_eq!(
            resolve_view(Some(&cycle()), &ViewerContext::participant(GROUP, ParticipantId::new(0x99))),
            DrawView::Drawn(slice)
        );
    }

    #[test]
    fn test_not_drawn_is_distinct_from_empty() {
        let viewer = ViewerContext::participant(GROUP, A);
        assert_eq!(resolve_view(None, &viewer), DrawView::NotDrawn);
        assert!(!resolve_view(None, &viewer).is_drawn());
    }

    #[test]
    fn test_host_of_other_group_sees_nothing() {
        let slice = visible_slice(&cycle(), &ViewerContext::host(GroupId::new(2), None));
        assert!(slice.is_empty());
    }

    #[test]
    fn test_role_before_draw() {
        assert_eq!(
            ViewerRole::classify(None, &ViewerContext::host(GROUP, None)),
            ViewerRole::Organizer
        );
        assert_eq!(
            ViewerRole::classify(None, &ViewerContext::host(GROUP, Some(A))),
            ViewerRole::ParticipatingHost
        );
        assert_eq!(
            ViewerRole::classify(None, &ViewerContext::participant(GROUP, A)),
            ViewerRole::Participant
        );
    }

    #[test]
    fn test_idea_visibility() {
        let mapping = cycle();
        // A gives to B, so A may read B's ideas
        assert!(can_view_ideas(Some(&mapping), &ViewerContext::participant(GROUP, A), B));
        // C does not give to B
        assert!(!can_view_ideas(Some(&mapping), &ViewerContext::participant(GROUP, C), B));
        // Own list always
        assert!(can_view_ideas(None, &ViewerContext::participant(GROUP, C), C));
        // Nobody else's before the draw
        assert!(!can_view_ideas(None, &ViewerContext::participant(GROUP, A), B));
        // Organizer sees all
        assert!(can_view_ideas(Some(&mapping), &ViewerContext::host(GROUP, None), B));
        // Participating host is just a participant
        assert!(!can_view_ideas(Some(&mapping), &ViewerContext::host(GROUP, Some(C)), B));
    }
}
