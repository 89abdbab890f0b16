//! Kringle Core - Fundamental types for gift-exchange groups
//!
//! This crate defines the types shared by every other Kringle crate:
//! - Identifiers (GroupId, ParticipantId, PairId, IdeaId)
//! - Access codes
//! - Group, participant, roster and gift idea records
//! - The assignment mapping and its derangement check
//! - Viewer context and sessions
//! - Group events carried by the change propagation channel

pub mod access;
pub mod assignment;
pub mod error;
pub mod event;
pub mod id;
pub mod model;
pub mod time;
pub mod viewer;

pub use access::*;
pub use assignment::*;
pub use error::*;
pub use event::*;
pub use id::*;
pub use model::*;
pub use time::*;
pub use viewer::*;
