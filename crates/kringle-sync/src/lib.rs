//! Kringle Sync - Change propagation channel
//!
//! Every committed change to a group is encoded as a wire frame and
//! broadcast on that group's stream. Observers hold a `GroupView` and
//! apply deliveries idempotently:
//! - duplicates are dropped by event identity
//! - removed participants are tombstoned, so late inserts stay removed
//! - the roster is ordered by join sequence, not by arrival
//! - lag, silence or an undecodable frame trigger a full resync
//!
//! The transport is treated as at-least-once with no ordering promise.

pub mod duration;
pub mod hub;
pub mod observer;
pub mod sink;
pub mod view;

pub use hub::*;
pub use observer::*;
pub use sink::*;
pub use view::*;
