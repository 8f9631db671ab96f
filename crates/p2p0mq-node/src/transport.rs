use std::time::Duration;

use p2p0mq_proto::NodeId;

use crate::error::TransportError;

/// The multi-part, CURVE-authenticated socket collaborator (§6). The
/// core only ever reaches it through this trait — `zmq_transport`
/// ships the one concrete implementation this workspace needs, but
/// nothing in `p2p0mq-node` otherwise depends on `zmq` directly.
///
/// Acceptable socket types per the spec: a router-style server socket
/// for the receiver side, a dealer-style client socket (one per known
/// peer, so sends can target a specific peer) for the sender side.
pub trait Transport: Send + Sync {
    /// The identity this transport presents on every socket —
    /// equal to the local `NodeId`.
    fn local_id(&self) -> &NodeId;

    /// Binds the inbound (router-style) socket. Called once at
    /// start-up.
    fn bind_receiver(&self, address: &str) -> Result<(), TransportError>;

    /// Ensures an outbound connection to `peer` at `address` exists.
    /// Idempotent: calling it again for an already-connected peer is a
    /// no-op.
    fn ensure_peer_connection(&self, peer: &NodeId, address: &str) -> Result<(), TransportError>;

    /// Tears down the outbound connection to `peer`, if any.
    fn disconnect_peer(&self, peer: &NodeId) -> Result<(), TransportError>;

    /// Sends a pre-framed message to `peer`. Fails with
    /// [`TransportError::NoRoute`] if no connection has been
    /// established yet.
    fn send(&self, peer: &NodeId, frames: Vec<Vec<u8>>) -> Result<(), TransportError>;

    /// Blocks for up to `timeout` waiting for an inbound frame.
    /// Returns `Ok(None)` on timeout (not an error — the receiver
    /// worker loops on this). The returned `NodeId` is the peer that
    /// physically sent the frame (the router socket's identity frame)
    /// — it becomes `previous_hop` on decode.
    fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Option<(NodeId, Vec<Vec<u8>>)>, TransportError>;

    /// Tells the transport to reload its CURVE trust store after an
    /// `exchange_certificates` call (§5). A no-op for transports that
    /// do not do CURVE authentication.
    fn reload_trust_store(&self) -> Result<(), TransportError>;

    /// Closes the inbound (router-style) socket. Called only by the
    /// receiver worker on its own shutdown (§5) — must not touch any
    /// sender-side socket, since the sender worker tears down
    /// independently and may still be running.
    fn close_receiver(&self) -> Result<(), TransportError>;

    /// Closes every outbound (dealer-style) connection. Called only
    /// by the sender worker on its own shutdown (§5) — must not touch
    /// the receiver-side socket.
    fn close_sender(&self) -> Result<(), TransportError>;
}

#[cfg(feature = "zmq-transport")]
pub mod zmq_transport;
#[cfg(feature = "zmq-transport")]
pub use zmq_transport::ZmqTransport;
