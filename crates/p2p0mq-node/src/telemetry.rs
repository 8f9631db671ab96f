use p2p0mq_proto::{Message, NodeId};

use crate::peer::PeerState;

/// Optional, purely observational hook (§4.11) — the Rust analog of
/// the original `LocalPeer.monitor()` socket-event poller. Nothing in
/// this trait affects correctness; a handler or worker never branches
/// on its return value because it has none.
pub trait TelemetryHook: Send + Sync {
    fn on_loop(&self, _processed: usize) {}
    fn on_message_sent(&self, _message: &Message) {}
    fn on_message_dropped(&self, _message: &Message) {}
    fn on_peer_state_change(&self, _peer: &NodeId, _from: PeerState, _to: PeerState) {}
}

/// Default implementation: emits `tracing` events instead of the
/// original's raw ZMQ monitor-socket logging.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl TelemetryHook for TracingTelemetry {
    fn on_loop(&self, processed: usize) {
        if processed > 0 {
            tracing::trace!(processed, "app loop processed messages");
        }
    }

    fn on_message_sent(&self, message: &Message) {
        tracing::debug!(
            command = %String::from_utf8_lossy(&message.command),
            message_id = message.message_id,
            "message sent"
        );
    }

    fn on_message_dropped(&self, message: &Message) {
        tracing::debug!(
            command = %String::from_utf8_lossy(&message.command),
            message_id = message.message_id,
            "message dropped"
        );
    }

    fn on_peer_state_change(&self, peer: &NodeId, from: PeerState, to: PeerState) {
        tracing::info!(peer = %peer, ?from, ?to, "peer state changed");
    }
}

/// No-op implementation, useful for tests that do not care about
/// telemetry output.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTelemetry;

impl TelemetryHook for NullTelemetry {}
