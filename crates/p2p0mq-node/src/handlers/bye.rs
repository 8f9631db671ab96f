//! Bye handler (command `bye`, §4.12): best-effort disconnect courtesy.
//! No original source equivalent — the Python peer only ever decays via
//! heart-beat timeout. Added so cooperating peers converge on a clean
//! `NO_CONNECTION` immediately instead of waiting out
//! `UNRESPONSIVE_THRESHOLD`/`NO_CONNECTION_THRESHOLD`; a peer that
//! doesn't recognise `bye` simply times out as before.

use p2p0mq_proto::{Kind, Message, Payload, Priority};

use crate::context::NodeContext;
use crate::handler::{Handler, HandlerReply};
use crate::peer::{Peer, PeerState};

pub const COMMAND: &[u8] = b"bye";

#[derive(Default)]
pub struct ByeHandler;

impl ByeHandler {
    pub fn new() -> Self {
        Self
    }

    fn compose(ctx: &NodeContext, peer: &Peer) -> Message {
        let next_hop = peer.via.clone().unwrap_or_else(|| peer.id.clone());
        Message {
            source: ctx.local_id.clone(),
            destination: peer.id.clone(),
            previous_hop: ctx.local_id.clone(),
            next_hop,
            command: COMMAND.to_vec(),
            kind: Kind::Request,
            message_id: ctx.next_message_id(),
            time_to_live: ctx.default_ttl(),
            payload: Payload::new(),
        }
    }

    /// One `bye` request for every peer the local node currently
    /// considers reachable, sent at `Priority::Fast` so it beats
    /// whatever else is queued ahead of socket teardown.
    pub fn compose_for_all_connected(ctx: &NodeContext) -> Vec<(Priority, Message)> {
        ctx.peers
            .snapshot()
            .into_iter()
            .filter(|p| matches!(p.state(), PeerState::Connected | PeerState::Routed))
            .map(|p| (Priority::Fast, Self::compose(ctx, &p)))
            .collect()
    }
}

impl Handler for ByeHandler {
    fn command_id(&self) -> &'static [u8] {
        COMMAND
    }

    fn on_request(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let now = ctx.now();
        let known = ctx
            .peers
            .with_peer_mut(&message.source, |peer| peer.declare_no_connection(&ctx.config, now))
            .is_some();
        if !known {
            tracing::debug!(peer = %message.source, "bye from unknown peer, ignoring");
        }
        None
    }
}
