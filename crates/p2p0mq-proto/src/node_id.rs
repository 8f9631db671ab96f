use std::fmt;

use crate::error::CodecError;

/// Minimum length, in bytes, a [`NodeId`] is allowed to have.
///
/// Mirrors the original source's `uuid` length check (at least 4
/// characters) applied to the raw identity bytes rather than a hex
/// string.
pub const MIN_NODE_ID_LEN: usize = 4;

/// Opaque identity of a peer. Equal-by-value, hashable, and cheap to
/// clone — it is copied into every `Message` and `Peer`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Vec<u8>);

impl NodeId {
    /// Builds a `NodeId`, rejecting anything shorter than
    /// [`MIN_NODE_ID_LEN`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self, CodecError> {
        let bytes = bytes.into();
        if bytes.len() < MIN_NODE_ID_LEN {
            return Err(CodecError::NodeIdTooShort {
                min: MIN_NODE_ID_LEN,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(&self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}
