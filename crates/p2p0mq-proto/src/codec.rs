//! Wire framing for `Message`.
//!
//! A frame is always 7 parts. The ZMQ ROUTER identity frame that
//! precedes it on the wire is stripped by the transport before it
//! reaches this codec — see `hooteproto::frame::from_frames_with_identity`
//! for the sibling idiom of scanning past a leading identity frame.
//! `previous_hop` is therefore never part of the 7 fields below: it is
//! supplied by the transport (whoever physically handed us the bytes)
//! at decode time.

use crate::error::CodecError;
use crate::message::{Message, Payload};
use crate::node_id::NodeId;
use crate::priority::Kind;

pub const FRAME_COUNT: usize = 7;

/// Encodes `message` for transmission by a node whose identity is
/// `local_id`.
///
/// Elision rules (§4.1):
/// - the source field is empty when `message.source == local_id`;
/// - the destination field is empty when
///   `message.destination == message.next_hop`.
///
/// These are two independent conditions — conflating them reproduces
/// the tautological bug the original source carried (`self.to if
/// self.to != self.to else b''`); `tests::elision_conditions_are_independent`
/// guards against that regression.
pub fn encode(message: &Message, local_id: &NodeId) -> Result<Vec<Vec<u8>>, CodecError> {
    let source_field = if &message.source == local_id {
        Vec::new()
    } else {
        message.source.as_bytes().to_vec()
    };
    let dest_field = if message.destination == message.next_hop {
        Vec::new()
    } else {
        message.destination.as_bytes().to_vec()
    };
    let message_id = rmp_serde::to_vec(&message.message_id).map_err(CodecError::MessageIdEncode)?;
    let payload = rmp_serde::to_vec(&message.payload).map_err(CodecError::PayloadEncode)?;

    Ok(vec![
        message.next_hop.as_bytes().to_vec(),
        source_field,
        dest_field,
        vec![message.kind.to_byte()],
        message.command.clone(),
        message_id,
        payload,
    ])
}

/// Decodes a 7-part frame received (via `previous_hop`, the peer that
/// physically sent it) by the node whose identity is `local_id`.
///
/// `time_to_live` is never transmitted on the wire (it is a
/// per-node deadline, not shared state) — the caller assigns a fresh
/// one, typically `now() + DEFAULT_TIME_TO_LIVE`, which is what
/// `default_ttl` becomes on the decoded `Message`.
pub fn decode(
    parts: &[Vec<u8>],
    previous_hop: NodeId,
    local_id: &NodeId,
    default_ttl: crate::message::Timestamp,
) -> Result<Message, CodecError> {
    if parts.len() != FRAME_COUNT {
        return Err(CodecError::WrongPartCount {
            expected: FRAME_COUNT,
            actual: parts.len(),
        });
    }

    let next_hop = NodeId::new(parts[0].clone())?;

    let source = if parts[1].is_empty() {
        previous_hop.clone()
    } else {
        NodeId::new(parts[1].clone())?
    };

    let destination = if parts[2].is_empty() {
        next_hop.clone()
    } else {
        NodeId::new(parts[2].clone())?
    };

    if parts[3].len() != 1 {
        return Err(CodecError::InvalidKindLength(parts[3].len()));
    }
    let kind = Kind::from_byte(parts[3][0]).ok_or(CodecError::UnknownKind(parts[3][0]))?;

    let command = parts[4].clone();

    let message_id: u64 =
        rmp_serde::from_slice(&parts[5]).map_err(CodecError::MessageIdDecode)?;
    let payload: Payload = rmp_serde::from_slice(&parts[6]).map_err(CodecError::PayloadDecode)?;

    Ok(Message {
        source,
        destination,
        previous_hop,
        next_hop,
        command,
        kind,
        message_id,
        time_to_live: default_ttl,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    fn sample(local: &NodeId, dest: &NodeId, next_hop: &NodeId) -> Message {
        Message {
            source: local.clone(),
            destination: dest.clone(),
            previous_hop: id(b"irrelevant-on-encode"),
            next_hop: next_hop.clone(),
            command: b"hello".to_vec(),
            kind: Kind::Request,
            message_id: 7,
            time_to_live: 9999,
            payload: Payload::new(),
        }
    }

    #[test]
    fn rejects_wrong_part_count() {
        let parts = vec![vec![1, 2, 3, 4]; 6];
        let err = decode(&parts, id(b"peer"), &id(b"self"), 9999).unwrap_err();
        assert!(matches!(err, CodecError::WrongPartCount { expected: 7, actual: 6 }));
    }

    #[test]
    fn round_trips_with_source_elided_when_local_is_source() {
        let local = id(b"local");
        let dest = id(b"dest");
        let next_hop = id(b"next");
        let msg = sample(&local, &dest, &next_hop);

        let frames = encode(&msg, &local).unwrap();
        assert!(frames[1].is_empty(), "source field should be elided");
        assert!(!frames[2].is_empty(), "dest field should not be elided here");

        let decoded = decode(&frames, id(b"prev"), &local, 9999).unwrap();
        assert_eq!(decoded.source, local);
        assert_eq!(decoded.destination, dest);
        assert_eq!(decoded.next_hop, next_hop);
        assert_eq!(decoded.previous_hop, id(b"prev"));
        assert_eq!(decoded.message_id, msg.message_id);
    }

    #[test]
    fn round_trips_with_dest_elided_when_dest_equals_next_hop() {
        let local = id(b"local");
        let shared = id(b"shared-dest-and-next-hop");
        let msg = sample(&local, &shared, &shared);

        let frames = encode(&msg, &local).unwrap();
        assert!(frames[2].is_empty(), "dest field should be elided");

        let decoded = decode(&frames, id(b"prev"), &local, 9999).unwrap();
        assert_eq!(decoded.destination, shared);
        assert_eq!(decoded.next_hop, shared);
    }

    #[test]
    fn elision_conditions_are_independent() {
        // source != local, dest != next_hop: neither field elided.
        let local = id(b"local");
        let other = id(b"other-source");
        let dest = id(b"dest");
        let next_hop = id(b"next-hop");
        let mut msg = sample(&local, &dest, &next_hop);
        msg.source = other.clone();

        let frames = encode(&msg, &local).unwrap();
        assert!(!frames[1].is_empty());
        assert!(!frames[2].is_empty());

        let decoded = decode(&frames, id(b"prev"), &local, 9999).unwrap();
        assert_eq!(decoded.source, other);
        assert_eq!(decoded.destination, dest);
    }

    #[test]
    fn unknown_kind_byte_is_rejected() {
        let local = id(b"local");
        let msg = sample(&local, &id(b"dest"), &id(b"next"));
        let mut frames = encode(&msg, &local).unwrap();
        frames[3] = vec![0xee];
        let err = decode(&frames, id(b"prev"), &local, 9999).unwrap_err();
        assert!(matches!(err, CodecError::UnknownKind(0xee)));
    }
}
