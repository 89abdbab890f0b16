//! Kringle Wire - Binary frame format for group events
//!
//! A frame is a fixed 22-byte header followed by an event body:
//! - Byte 0: Wire version
//! - Byte 1: Event type
//! - Bytes 2-9: Group ID (LE)
//! - Bytes 10-17: Event sequence (LE)
//! - Bytes 18-21: Body length (LE)
//!
//! Observers treat any frame that fails to decode as a signal to
//! resynchronize from the source of truth.

pub mod codec;
pub mod error;
pub mod header;

pub use codec::*;
pub use error::*;
pub use header::*;
