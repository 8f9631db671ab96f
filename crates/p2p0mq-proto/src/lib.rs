//! Wire protocol for p2p0mq mesh nodes: node identities, the message
//! envelope, the priority/kind enums, and the 7-part frame codec.
//!
//! This crate has no knowledge of threads, sockets, or handlers — it
//! is the leaf dependency every other p2p0mq crate builds on, the way
//! `hooteproto` sits under `hootenanny` in the sibling workspace.

pub mod codec;
pub mod error;
pub mod message;
pub mod node_id;
pub mod priority;

pub use codec::{decode, encode, FRAME_COUNT};
pub use error::CodecError;
pub use message::{now, Message, Payload, Timestamp};
pub use node_id::{NodeId, MIN_NODE_ID_LEN};
pub use priority::{Kind, Priority};
