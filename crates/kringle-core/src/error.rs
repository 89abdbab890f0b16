//! Error types for Kringle

use thiserror::Error;

use crate::{GroupId, ParticipantId};

/// Core Kringle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KringleError {
    // Draw errors
    #[error("Not enough participants to draw: need at least {required}, have {actual}")]
    PreconditionFailed { required: usize, actual: usize },

    #[error("Group {0} has already been drawn")]
    AlreadyDrawn(GroupId),

    #[error("Assignment impossible for {participants} participants after {attempts} attempts")]
    AssignmentImpossible { participants: usize, attempts: u32 },

    // Roster errors
    #[error("A participant named {name:?} already exists in group {group}")]
    DuplicateName { group: GroupId, name: String },

    // Lookup errors
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Participant not found: {0}")]
    ParticipantNotFound(ParticipantId),

    #[error("No group uses access code {0}")]
    AccessCodeNotFound(String),

    #[error("No free access code found after {0} attempts")]
    AccessCodeExhausted(u32),

    // Input errors
    #[error("Invalid access code {0:?}: expected 6 characters from A-Z and 0-9")]
    InvalidAccessCode(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    // Propagation errors
    #[error("Wire error: {0}")]
    Wire(String),

    #[error("Resynchronization failed: {0}")]
    Resync(String),
}

impl KringleError {
    /// Whether the caller can fix the situation and try again.
    ///
    /// `AssignmentImpossible` is an internal invariant violation and the only
    /// unrecoverable kind.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, KringleError::AssignmentImpossible { .. })
    }

    /// Short user-facing hint about what to do next
    pub fn corrective_action(&self) -> String {
        match self {
            KringleError::PreconditionFailed { required, actual } => format!(
                "add {} more participant(s); a draw needs at least {}",
                required.saturating_sub(*actual),
                required
            ),
            KringleError::AlreadyDrawn(_) => "the draw is final; view the existing result".into(),
            KringleError::AssignmentImpossible { .. } => {
                "internal error; report it to the organizer".into()
            }
            KringleError::DuplicateName { .. } => "choose a different name".into(),
            KringleError::GroupNotFound(_) | KringleError::ParticipantNotFound(_) => {
                "check the link or session and try again".into()
            }
            KringleError::AccessCodeNotFound(_) | KringleError::InvalidAccessCode(_) => {
                "check the access code and try again".into()
            }
            KringleError::AccessCodeExhausted(_) => "try creating the group again".into(),
            KringleError::InvalidInput(_) => "correct the input and try again".into(),
            KringleError::NotAuthorized(_) => "sign in with the right session".into(),
            KringleError::Wire(_) | KringleError::Resync(_) => "reload the group".into(),
        }
    }
}

/// Result type for Kringle operations
pub type KringleResult<T> = Result<T, KringleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_assignment_impossible_is_fatal() {
        let fatal = KringleError::AssignmentImpossible {
            participants: 4,
            attempts: 500,
        };
        assert!(!fatal.is_recoverable());
        assert!(KringleError::AlreadyDrawn(GroupId::new(1)).is_recoverable());
        assert!(KringleError::PreconditionFailed {
            required: 3,
            actual: 1
        }
        .is_recoverable());
    }

    #[test]
    fn test_precondition_message_states_minimum() {
        let err = KringleError::PreconditionFailed {
            required: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("at least 3"));
        assert_eq!(
            err.corrective_action(),
            "add 1 more participant(s); a draw needs at least 3"
        );
    }
}
