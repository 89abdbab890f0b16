//! Kringle Test Harness - Delivery chaos and convergence checks
//!
//! This crate provides:
//! - A seeded chaos link that drops, truncates, duplicates and reorders
//!   event frames
//! - A recording notification sink that captures what the service
//!   publishes
//! - A convergence harness driving a real service with several simulated
//!   observers, each behind its own chaos link

pub mod chaos;
pub mod harness;

pub use chaos::*;
pub use harness::*;
