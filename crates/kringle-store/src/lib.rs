//! Kringle Store - Persistence provider
//!
//! This crate defines what Kringle needs from durable storage:
//! - Point lookups for groups and participants
//! - Roster, mapping and gift idea lookups by group
//! - Access-code resolution
//! - Atomic roster mutations that respect the draw state
//! - An atomic "insert mapping only if none exists" commit
//!
//! `MemoryStore` is the in-process implementation.

pub mod memory;
pub mod store;

pub use memory::*;
pub use store::*;
