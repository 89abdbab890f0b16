//! Fixed frame header

use bytes::{Buf, BufMut};
use kringle_core::{EventType, GroupId};

use crate::{WireError, WireResult};

/// Fixed header size in bytes
pub const FRAME_HEADER_SIZE: usize = 22;

/// Current wire version
pub const WIRE_VERSION: u8 = 1;

/// Fixed header structure
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub event_type: EventType,
    pub group_id: GroupId,
    pub seq: u64,
    pub body_len: u32,
}

impl FrameHeader {
    pub fn new(event_type: EventType, group_id: GroupId, seq: u64, body_len: u32) -> Self {
        FrameHeader {
            version: WIRE_VERSION,
            event_type,
            group_id,
            seq,
            body_len,
        }
    }

    /// Parse the header from the front of `buf`
    pub fn parse(mut buf: &[u8]) -> WireResult<Self> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(WireError::BufferTooShort {
                expected: FRAME_HEADER_SIZE,
                actual: buf.len(),
            });
        }

        let version = buf.get_u8();
        if version != WIRE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }

        let type_byte = buf.get_u8();
        let event_type =
            EventType::from_byte(type_byte).ok_or(WireError::UnknownEventType(type_byte))?;
        let group_id = GroupId::new(buf.get_u64_le());
        let seq = buf.get_u64_le();
        let body_len = buf.get_u32_le();

        Ok(FrameHeader {
            version,
            event_type,
            group_id,
            seq,
            body_len,
        })
    }

    pub fn write<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.version);
        buf.put_u8(self.event_type.to_byte());
        buf.put_u64_le(self.group_id.0);
        buf.put_u64_le(self.seq);
        buf.put_u32_le(self.body_len);
    }
}
