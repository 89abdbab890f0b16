//! Viewer context and sessions
//!
//! The identity of the caller is always passed explicitly. Nothing in
//! Kringle reads ambient session state.

use serde::{Deserialize, Serialize};

use crate::{GroupId, ParticipantId};

/// Who is asking: supplied per request by the identity provider
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewerContext {
    /// `None` for a host who only organizes
    pub participant_id: Option<ParticipantId>,
    pub group_id: GroupId,
    pub is_host: bool,
}

impl ViewerContext {
    pub fn participant(group_id: GroupId, participant_id: ParticipantId) -> Self {
        ViewerContext {
            participant_id: Some(participant_id),
            group_id,
            is_host: false,
        }
    }

    pub fn host(group_id: GroupId, participant_id: Option<ParticipantId>) -> Self {
        ViewerContext {
            participant_id,
            group_id,
            is_host: true,
        }
    }
}

/// Session handed back to a caller after creating or joining a group
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub group_id: GroupId,
    pub participant_id: Option<ParticipantId>,
    pub name: String,
    pub is_host: bool,
}

impl Session {
    pub fn viewer(&self) -> ViewerContext {
        ViewerContext {
            participant_id: self.participant_id,
            group_id: self.group_id,
            is_host: self.is_host,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_viewer() {
        let session = Session {
            group_id: GroupId::new(1),
            participant_id: None,
            name: "Olga".into(),
            is_host: true,
        };
        assert_eq!(session.viewer(), ViewerContext::host(GroupId::new(1), None));
    }
}
