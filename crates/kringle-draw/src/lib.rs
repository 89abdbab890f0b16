//! Kringle Draw - Assignment engine and visibility rules
//!
//! This crate holds the two pure pieces of the system:
//! - The draw engine, which turns a roster into a derangement by
//!   randomized rejection sampling
//! - The visibility resolver, which decides which pairs of a mapping a
//!   viewer may see
//!
//! Neither touches storage. Exactly-once commit is the store's job.

pub mod engine;
pub mod visibility;

pub use engine::*;
pub use visibility::*;
