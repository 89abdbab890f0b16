//! Kringle Runtime - Gift-exchange service
//!
//! `GiftExchange` ties the pieces together. Every mutation of a group runs
//! under that group's lock as one step:
//! 1. Check authorization and input
//! 2. Check the draw state
//! 3. Compute (roster change, draw, wish list entry)
//! 4. Commit to the store, which re-checks atomically
//! 5. Publish the committed event on the group's stream
//!
//! Publication inside the lock keeps each group's stream in commit order.

pub mod config;
pub mod locks;
pub mod service;
pub mod telemetry;

pub use config::*;
pub use service::*;
pub use telemetry::*;
