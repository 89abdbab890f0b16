//! Event body encoding
//!
//! Bodies by event type:
//! - ParticipantJoined: id, joined_seq, joined_at, name, contact
//! - ParticipantLeft: id
//! - DrawCommitted: drawn_at, pair count (u32), pairs of (pair id, giver, receiver)
//! - IdeaAdded: id, participant id, created_at, title, image flag, [image url]
//!
//! Integers are little-endian; strings are a u16 length followed by UTF-8.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use kringle_core::{
    Assignment, AssignmentMapping, EventEnvelope, EventType, GiftIdea, GroupEvent, GroupId, IdeaId,
    PairId, Participant, ParticipantId, Timestamp,
};

use crate::{FrameHeader, WireError, WireResult, FRAME_HEADER_SIZE};

const PAIR_SIZE: usize = 24;

/// Encode an event into a self-contained frame
pub fn encode_event(envelope: &EventEnvelope) -> WireResult<Bytes> {
    let mut body = BytesMut::new();

    match &envelope.event {
        GroupEvent::ParticipantJoined(p) => {
            body.put_u64_le(p.id.0);
            body.put_u64_le(p.joined_seq);
            body.put_i64_le(p.joined_at.as_micros());
            put_str(&mut body, "name", &p.name)?;
            put_str(&mut body, "contact", &p.contact)?;
        }
        GroupEvent::ParticipantLeft { participant_id } => {
            body.put_u64_le(participant_id.0);
        }
        GroupEvent::DrawCommitted(mapping) => {
            let count = u32::try_from(mapping.len()).map_err(|_| WireError::FieldTooLong {
                field: "pairs",
                len: mapping.len(),
            })?;
            body.put_i64_le(mapping.drawn_at.as_micros());
            body.put_u32_le(count);
            for pair in mapping.pairs() {
                body.put_u64_le(pair.id.0);
                body.put_u64_le(pair.giver.0);
                body.put_u64_le(pair.receiver.0);
            }
        }
        GroupEvent::IdeaAdded(idea) => {
            body.put_u64_le(idea.id.0);
            body.put_u64_le(idea.participant_id.0);
            body.put_i64_le(idea.created_at.as_micros());
            put_str(&mut body, "title", &idea.title)?;
            match &idea.image_url {
                Some(url) => {
                    body.put_u8(1);
                    put_str(&mut body, "image_url", url)?;
                }
                None => body.put_u8(0),
            }
        }
    }

    let body_len = u32::try_from(body.len()).map_err(|_| WireError::FieldTooLong {
        field: "body",
        len: body.len(),
    })?;
    let header = FrameHeader::new(
        envelope.event.event_type(),
        envelope.group_id,
        envelope.seq,
        body_len,
    );

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_SIZE + body.len());
    header.write(&mut frame);
    frame.extend_from_slice(&body);
    Ok(frame.freeze())
}

/// Decode a frame produced by [`encode_event`]
pub fn decode_event(frame: &[u8]) -> WireResult<EventEnvelope> {
    let header = FrameHeader::parse(frame)?;
    let mut body = &frame[FRAME_HEADER_SIZE..];

    if body.len() != header.body_len as usize {
        return Err(WireError::LengthMismatch {
            declared: header.body_len as usize,
            actual: body.len(),
        });
    }

    let group_id = header.group_id;
    let event = match header.event_type {
        EventType::ParticipantJoined => {
            need(body, 24)?;
            let id = ParticipantId::new(body.get_u64_le());
            let joined_seq = body.get_u64_le();
            let joined_at = Timestamp::from_micros(body.get_i64_le());
            let name = get_str(&mut body, "name")?;
            let contact = get_str(&mut body, "contact")?;
            GroupEvent::ParticipantJoined(Participant {
                id,
                group_id,
                name,
                contact,
                joined_seq,
                joined_at,
            })
        }
        EventType::ParticipantLeft => {
            need(body, 8)?;
            GroupEvent::ParticipantLeft {
                participant_id: ParticipantId::new(body.get_u64_le()),
            }
        }
        EventType::DrawCommitted => {
            need(body, 12)?;
            let drawn_at = Timestamp::from_micros(body.get_i64_le());
            let count = body.get_u32_le() as usize;
            // Check before allocating so a forged count cannot balloon memory
            if body.remaining() != count.saturating_mul(PAIR_SIZE) {
                return Err(WireError::InvalidField("pair count"));
            }
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                pairs.push(Assignment::new(
                    PairId::new(body.get_u64_le()),
                    ParticipantId::new(body.get_u64_le()),
                    ParticipantId::new(body.get_u64_le()),
                ));
            }
            GroupEvent::DrawCommitted(AssignmentMapping::new(group_id, pairs, drawn_at))
        }
        EventType::IdeaAdded => {
            need(body, 24)?;
            let id = IdeaId::new(body.get_u64_le());
            let participant_id = ParticipantId::new(body.get_u64_le());
            let created_at = Timestamp::from_micros(body.get_i64_le());
            let title = get_str(&mut body, "title")?;
            need(body, 1)?;
            let image_url = match body.get_u8() {
                0 => None,
                1 => Some(get_str(&mut body, "image_url")?),
                _ => return Err(WireError::InvalidField("image flag")),
            };
            GroupEvent::IdeaAdded(GiftIdea {
                id,
                participant_id,
                group_id,
                title,
                image_url,
                created_at,
            })
        }
    };

    if body.has_remaining() {
        return Err(WireError::InvalidField("trailing bytes"));
    }

    Ok(EventEnvelope::new(group_id, header.seq, event))
}

/// Peek the group of a frame without decoding its body
pub fn frame_group(frame: &[u8]) -> WireResult<GroupId> {
    FrameHeader::parse(frame).map(|h| h.group_id)
}

fn need(buf: &[u8], n: usize) -> WireResult<()> {
    if buf.remaining() < n {
        return Err(WireError::BufferTooShort {
            expected: n,
            actual: buf.remaining(),
        });
    }
    Ok(())
}

fn put_str(buf: &mut BytesMut, field: &'static str, s: &str) -> WireResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| WireError::FieldTooLong {
        field,
        len: s.len(),
    })?;
    buf.put_u16_le(len);
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn get_str(buf: &mut &[u8], field: &'static str) -> WireResult<String> {
    need(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    need(buf, len)?;
    let s = std::str::from_utf8(&buf[..len])
        .map_err(|_| WireError::InvalidUtf8(field))?
        .to_owned();
    buf.advance(len);
    Ok(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn joined() -> EventEnvelope {
        let mut p = Participant::new(ParticipantId::new(11), GroupId::new(3), "Ana", "ana@mail", 4);
        p.joined_at = Timestamp::from_micros(99);
        EventEnvelope::new(GroupId::new(3), 4, GroupEvent::ParticipantJoined(p))
    }

    #[test]
    fn test_participant_joined_frame() {
        let envelope = joined();
        let frame = encode_event(&envelope).unwrap();
        let decoded = decode_event(&frame).unwrap();

        assert_eq!(decoded.seq, 4);
        match decoded.event {
            GroupEvent::ParticipantJoined(p) => {
                assert_eq!(p.id, ParticipantId::new(11));
                assert_eq!(p.group_id, GroupId::new(3));
                assert_eq!(p.name, "Ana");
                assert_eq!(p.contact, "ana@mail");
                assert_eq!(p.joined_seq, 4);
                assert_eq!(p.joined_at, Timestamp::from_micros(99));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_draw_committed_frame() {
        let pairs = vec![
            Assignment::new(PairId::new(1), ParticipantId::new(1), ParticipantId::new(2)),
            Assignment::new(PairId::new(2), ParticipantId::new(2), ParticipantId::new(3)),
            Assignment::new(PairId::new(3), ParticipantId::new(3), ParticipantId::new(1)),
        ];
        let mapping = AssignmentMapping::new(GroupId::new(8), pairs, Timestamp::from_micros(5));
        let envelope = EventEnvelope::new(GroupId::new(8), 9, GroupEvent::DrawCommitted(mapping));

        let frame = encode_event(&envelope).unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + 12 + 3 * PAIR_SIZE);
        assert_eq!(decode_event(&frame).unwrap(), envelope);
    }

    #[test]
    fn test_idea_with_and_without_image() {
        for image_url in [None, Some("https://img.example/socks.png".to_string())] {
            let idea = GiftIdea {
                id: IdeaId::new(4),
                participant_id: ParticipantId::new(2),
                group_id: GroupId::new(1),
                title: "Calcetines".into(),
                image_url,
                created_at: Timestamp::from_micros(12),
            };
            let envelope = EventEnvelope::new(GroupId::new(1), 2, GroupEvent::IdeaAdded(idea));
            let frame = encode_event(&envelope).unwrap();
            assert_eq!(decode_event(&frame).unwrap(), envelope);
        }
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let frame = encode_event(&joined()).unwrap();
        let cut = &frame[..frame.len() - 1];
        assert!(matches!(
            decode_event(cut),
            Err(WireError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_forged_pair_count_is_rejected() {
        let mut frame = BytesMut::new();
        FrameHeader::new(EventType::DrawCommitted, GroupId::new(1), 1, 12).write(&mut frame);
        frame.put_i64_le(0);
        frame.put_u32_le(u32::MAX);
        assert_eq!(
            decode_event(&frame),
            Err(WireError::InvalidField("pair count"))
        );
    }

    #[test]
    fn test_oversized_name_is_rejected_on_encode() {
        let p = Participant::new(ParticipantId::new(1), GroupId::new(1), "x".repeat(70_000), "", 1);
        let envelope = EventEnvelope::new(GroupId::new(1), 1, GroupEvent::ParticipantJoined(p));
        assert!(matches!(
            encode_event(&envelope),
            Err(WireError::FieldTooLong { field: "name", .. })
        ));
    }

    proptest! {
        #[test]
        fn decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_event(&data);
        }

        #[test]
        fn decode_survives_header_prefixed_garbage(
            type_byte in prop_oneof![Just(0x01u8), Just(0x02), Just(0x10), Just(0x20)],
            body in proptest::collection::vec(any::<u8>(), 0..128),
        ) {
            let mut frame = BytesMut::new();
            frame.put_u8(crate::WIRE_VERSION);
            frame.put_u8(type_byte);
            frame.put_u64_le(1);
            frame.put_u64_le(1);
            frame.put_u32_le(body.len() as u32);
            frame.extend_from_slice(&body);
            let _ = decode_event(&frame);
        }
    }
}
