//! Router (§4.7): dispatches `ROUTE`-kind inbound messages that are
//! neither addressed to, nor originated by, this node.

use p2p0mq_proto::{Message, Priority};

use crate::context::NodeContext;
use crate::handlers::AskAroundHandler;
use crate::peer::PeerState;

/// One routed message, processed and ready for the sender: either a
/// forwarded message, or a batch of ask-around discovery requests (or
/// both, if discovery is triggered while nothing is known about the
/// destination yet).
#[derive(Default)]
pub struct RoutedOutcome {
    pub forwarded: Vec<(Priority, Message)>,
    pub discovery: Vec<(Priority, Message)>,
}

/// Processes one inbound `ROUTE`-kind `message`. Returns the messages
/// the sender should now enqueue; an empty result means the message
/// was dropped (malformed, expired, or no route could even be
/// attempted).
pub fn process_route(ctx: &NodeContext, ask_around: &AskAroundHandler, message: Message) -> RoutedOutcome {
    let mut outcome = RoutedOutcome::default();

    if message.destination == ctx.local_id {
        tracing::warn!(
            message_id = message.message_id,
            "routed message addressed to local_id reached the router; dropping"
        );
        return outcome;
    }

    let now = ctx.now();
    if message.time_to_live <= now {
        ctx.telemetry.on_message_dropped(&message);
        return outcome;
    }

    let destination = ctx.peers.clone_peer(&message.destination);
    match destination {
        Some(peer) if matches!(peer.state(), PeerState::Connected | PeerState::Routed) => {
            let mut forwarded = message;
            forwarded.previous_hop = ctx.local_id.clone();
            forwarded.next_hop = peer.via.clone().unwrap_or_else(|| peer.id.clone());
            outcome.forwarded.push((Priority::Medium, forwarded));
        }
        _ => {
            tracing::debug!(
                destination = %message.destination,
                "no known route; triggering an ask-around discovery batch"
            );
            outcome.discovery = ask_around.trigger_discovery(ctx, &message.destination);
        }
    }

    outcome
}
