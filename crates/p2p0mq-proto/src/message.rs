use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::CodecError;
use crate::node_id::NodeId;
use crate::priority::Kind;

/// Payload map carried by every message. Values are `rmpv::Value` so a
/// handler can stash arbitrary msgpack-representable data without the
/// codec needing to know its shape.
pub type Payload = BTreeMap<String, rmpv::Value>;

/// Absolute wall-clock deadline, seconds since the Unix epoch. Kept as
/// a plain integer (not `SystemTime`) so it round-trips through
/// msgpack without a serde shim, matching how the rest of the wire
/// format favors plain scalars.
pub type Timestamp = u64;

pub fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_secs()
}

/// A single routed unit, identical in memory to what the codec
/// produces and consumes on the wire, minus the `handler` reference:
/// that stays node-side, resolved from `command` through a
/// `HandlerRegistry` at dispatch time rather than stored on the
/// message itself (see the composition notes in the registry module).
#[derive(Debug, Clone)]
pub struct Message {
    pub source: NodeId,
    pub destination: NodeId,
    pub previous_hop: NodeId,
    pub next_hop: NodeId,
    pub command: Vec<u8>,
    pub kind: Kind,
    pub message_id: u64,
    pub time_to_live: Timestamp,
    pub payload: Payload,
}

impl Message {
    /// `valid_for_send`: every field required at send time is present
    /// and the deadline has not already passed.
    pub fn valid_for_send(&self, at: Timestamp) -> Result<(), CodecError> {
        if self.command.is_empty() {
            return Err(CodecError::InvalidForSend("command is empty"));
        }
        if self.time_to_live <= at {
            return Err(CodecError::InvalidForSend("time_to_live is not in the future"));
        }
        Ok(())
    }

    /// Builds a reply to `self`, copying `message_id`, swapping
    /// source/destination and previous/next hop, and reusing the
    /// default time-to-live rule (deadlines do not propagate from the
    /// request — the reply gets its own).
    pub fn reply_to(
        &self,
        local_id: NodeId,
        kind: Kind,
        payload: Payload,
        ttl: Timestamp,
    ) -> Message {
        Message {
            source: local_id,
            destination: self.source.clone(),
            previous_hop: self.previous_hop.clone(),
            next_hop: self.previous_hop.clone(),
            command: self.command.clone(),
            kind,
            message_id: self.message_id,
            time_to_live: ttl,
            payload,
        }
    }
}
