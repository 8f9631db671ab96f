//! Ask-around handler (command `r`, §4.6): limited-depth discovery of
//! an otherwise-unreachable peer by relaying through `CONNECTED`
//! neighbours. No surviving original source covers this concern —
//! reconstructed from its test fixtures and the spec's explicit
//! description of the wire contract and breadcrumb loop guard.

use p2p0mq_proto::{Kind, Message, NodeId, Payload};
use rmpv::Value;

use crate::context::NodeContext;
use crate::handler::{Handler, HandlerReply};
use crate::peer::{Peer, PeerState};

pub const COMMAND: &[u8] = b"r";

const TARGET_KEY: &str = "target";
const BREADCRUMBS_KEY: &str = "breadcrumbs";

#[derive(Default)]
pub struct AskAroundHandler;

impl AskAroundHandler {
    pub fn new() -> Self {
        Self
    }

    fn encode_breadcrumbs(breadcrumbs: &[NodeId]) -> Value {
        Value::Array(
            breadcrumbs
                .iter()
                .map(|id| Value::Binary(id.as_bytes().to_vec()))
                .collect(),
        )
    }

    fn decode_breadcrumbs(payload: &Payload) -> Option<Vec<NodeId>> {
        let entries = payload.get(BREADCRUMBS_KEY)?.as_array()?;
        entries
            .iter()
            .map(|v| v.as_slice().and_then(|b| NodeId::new(b.to_vec()).ok()))
            .collect()
    }

    fn decode_target(payload: &Payload) -> Option<NodeId> {
        payload
            .get(TARGET_KEY)?
            .as_slice()
            .and_then(|b| NodeId::new(b.to_vec()).ok())
    }

    fn compose_request(&self, ctx: &NodeContext, to: &Peer, target: &NodeId, breadcrumbs: &[NodeId]) -> Message {
        let mut payload = Payload::new();
        payload.insert(TARGET_KEY.to_string(), Value::Binary(target.as_bytes().to_vec()));
        payload.insert(BREADCRUMBS_KEY.to_string(), Self::encode_breadcrumbs(breadcrumbs));
        Message {
            source: ctx.local_id.clone(),
            destination: to.id.clone(),
            previous_hop: ctx.local_id.clone(),
            next_hop: to.id.clone(),
            command: COMMAND.to_vec(),
            kind: Kind::Request,
            message_id: ctx.next_message_id(),
            time_to_live: ctx.default_ttl(),
            payload,
        }
    }

    /// Fans a discovery request for `target` out to every `CONNECTED`
    /// peer except `target` itself and anything in `exclude` or
    /// already present in `breadcrumbs` (the loop guard). The returned
    /// breadcrumbs are `breadcrumbs + [local_id]`.
    fn compose_batch(
        &self,
        ctx: &NodeContext,
        target: &NodeId,
        exclude: &[NodeId],
        breadcrumbs: &[NodeId],
    ) -> Vec<(p2p0mq_proto::Priority, Message)> {
        let mut extended = breadcrumbs.to_vec();
        extended.push(ctx.local_id.clone());

        ctx.peers
            .snapshot()
            .into_iter()
            .filter(|p| p.state() == PeerState::Connected)
            .filter(|p| &p.id != target)
            .filter(|p| !exclude.contains(&p.id))
            .filter(|p| !breadcrumbs.contains(&p.id))
            .map(|p| {
                let message = self.compose_request(ctx, &p, target, &extended);
                (p2p0mq_proto::Priority::Fast, message)
            })
            .collect()
    }

    /// Entry point for the router (§4.7): asked to locate `target`
    /// when a routed message has no known destination, fans a fresh
    /// discovery batch out to every connected peer.
    pub fn trigger_discovery(&self, ctx: &NodeContext, target: &NodeId) -> Vec<(p2p0mq_proto::Priority, Message)> {
        self.compose_batch(ctx, target, &[], &[])
    }
}

impl Handler for AskAroundHandler {
    fn command_id(&self) -> &'static [u8] {
        COMMAND
    }

    fn tick(&mut self, ctx: &NodeContext) {
        let now = ctx.now();
        for peer in ctx.peers.snapshot() {
            // Peers the connector can dial directly (they have a host)
            // are its responsibility; ask-around only covers peers
            // that are already routed (to refresh the relay) or that
            // have no direct address at all and so can only ever be
            // reached by discovery.
            let eligible = match peer.state() {
                PeerState::Routed | PeerState::Unreachable => true,
                PeerState::Initial | PeerState::NoConnection => peer.host.is_none(),
                _ => false,
            };
            if !eligible {
                continue;
            }
            if peer.next_ask_around.is_some_and(|t| t > now) {
                continue;
            }

            ctx.peers.with_peer_mut(&peer.id, |p| {
                p.next_ask_around = Some(now + ctx.config.ask_around_interval.as_secs());
                p.last_ask_around = Some(now);
            });

            for (priority, message) in self.compose_batch(ctx, &peer.id, &[], &[]) {
                ctx.enqueue(priority, message);
            }
        }
    }

    fn on_request(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let target = match Self::decode_target(&message.payload) {
            Some(t) => t,
            None => return None,
        };
        let breadcrumbs = match Self::decode_breadcrumbs(&message.payload) {
            Some(b) => b,
            None => return None,
        };

        if target == ctx.local_id {
            return None;
        }

        let known_reachable = ctx
            .peers
            .clone_peer(&target)
            .filter(|p| matches!(p.state(), PeerState::Connected | PeerState::Routed))
            .is_some();

        if known_reachable {
            let mut payload = Payload::new();
            payload.insert(TARGET_KEY.to_string(), Value::Binary(target.as_bytes().to_vec()));
            payload.insert(BREADCRUMBS_KEY.to_string(), Self::encode_breadcrumbs(&breadcrumbs));
            return Some((
                p2p0mq_proto::Priority::Fast,
                message.reply_to(ctx.local_id.clone(), Kind::Reply, payload, ctx.default_ttl()),
            ));
        }

        let exclude = vec![message.previous_hop.clone()];
        for (priority, relayed) in self.compose_batch(ctx, &target, &exclude, &breadcrumbs) {
            ctx.enqueue(priority, relayed);
        }
        None
    }

    fn on_reply(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let target = match Self::decode_target(&message.payload) {
            Some(t) => t,
            None => return None,
        };
        let breadcrumbs = match Self::decode_breadcrumbs(&message.payload) {
            Some(b) => b,
            None => return None,
        };
        let hop_count = breadcrumbs.len();

        ctx.peers.with_peer_mut(&target, |peer| {
            let should_adopt = match peer.via_hop_count {
                None => true,
                Some(existing) => hop_count < existing,
            };
            if should_adopt {
                peer.via = Some(message.previous_hop.clone());
                peer.via_hop_count = Some(hop_count);
                if !matches!(peer.state(), PeerState::Connected | PeerState::Routed) {
                    peer.set_state(PeerState::Routed);
                }
            }
        });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::config::NodeConfig;
    use crate::context::MessageIdCounter;
    use crate::peer_table::PeerTable;
    use crate::queues::{ConnectionQueue, PriorityQueues};
    use crate::telemetry::NullTelemetry;
    use crate::wake::WakeSignal;
    use std::sync::Arc;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    fn ctx(clock: TestClock) -> NodeContext {
        let wake = WakeSignal::new();
        NodeContext {
            local_id: id(b"local"),
            config: Arc::new(NodeConfig::default()),
            clock: Arc::new(clock),
            peers: Arc::new(PeerTable::new()),
            outbound: Arc::new(PriorityQueues::new(wake.clone())),
            connections: Arc::new(ConnectionQueue::new(wake)),
            message_ids: Arc::new(MessageIdCounter::default()),
            telemetry: Arc::new(NullTelemetry),
        }
    }

    #[test]
    fn tick_fans_request_out_to_connected_peers_excluding_target() {
        let ctx = ctx(TestClock::new(1000));

        let mut unreachable = Peer::new(id(b"target"), None, None, None);
        unreachable.set_state(PeerState::Unreachable);
        ctx.peers.insert(unreachable);

        let mut connected = Peer::new(id(b"relay"), Some("h".into()), Some(1), None);
        connected.set_state(PeerState::Connected);
        ctx.peers.insert(connected);

        let mut handler = AskAroundHandler::new();
        handler.tick(&ctx);

        let sent = ctx.outbound.dequeue(10);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.destination, id(b"relay"));
        assert_eq!(
            ctx.peers.clone_peer(&id(b"target")).unwrap().next_ask_around,
            Some(1030)
        );
    }

    #[test]
    fn tick_covers_hostless_initial_peers_but_not_peers_with_a_host() {
        let ctx = ctx(TestClock::new(1000));

        // No host at all: the connector can never reach it, so
        // ask-around must.
        ctx.peers.insert(Peer::new(id(b"bare-target"), None, None, None));
        // Has a host: the connector's job, ask-around should leave it.
        ctx.peers
            .insert(Peer::new(id(b"dialable-target"), Some("h".into()), Some(1), None));

        let mut connected = Peer::new(id(b"relay"), Some("h".into()), Some(1), None);
        connected.set_state(PeerState::Connected);
        ctx.peers.insert(connected);

        let mut handler = AskAroundHandler::new();
        handler.tick(&ctx);

        let sent = ctx.outbound.dequeue(10);
        assert_eq!(sent.len(), 1, "only the bare peer should trigger a discovery batch");
        assert_eq!(
            ctx.peers.clone_peer(&id(b"bare-target")).unwrap().next_ask_around,
            Some(1030)
        );
        assert_eq!(
            ctx.peers.clone_peer(&id(b"dialable-target")).unwrap().next_ask_around,
            None,
            "a peer with a host is the connector's responsibility, not ask-around's"
        );
    }

    #[test]
    fn on_request_for_local_target_is_dropped() {
        let ctx = ctx(TestClock::new(1000));
        let mut handler = AskAroundHandler::new();
        let mut payload = Payload::new();
        payload.insert(TARGET_KEY.to_string(), Value::Binary(ctx.local_id.as_bytes().to_vec()));
        payload.insert(BREADCRUMBS_KEY.to_string(), AskAroundHandler::encode_breadcrumbs(&[]));
        let message = Message {
            source: id(b"asker"),
            destination: ctx.local_id.clone(),
            previous_hop: id(b"asker"),
            next_hop: ctx.local_id.clone(),
            command: COMMAND.to_vec(),
            kind: Kind::Request,
            message_id: 1,
            time_to_live: ctx.default_ttl(),
            payload,
        };
        assert!(handler.on_request(&ctx, &message).is_none());
    }

    #[test]
    fn on_request_replies_when_target_is_reachable() {
        let ctx = ctx(TestClock::new(1000));
        let mut known = Peer::new(id(b"known"), None, None, None);
        known.set_state(PeerState::Connected);
        ctx.peers.insert(known);

        let mut handler = AskAroundHandler::new();
        let mut payload = Payload::new();
        payload.insert(TARGET_KEY.to_string(), Value::Binary(id(b"known").as_bytes().to_vec()));
        payload.insert(BREADCRUMBS_KEY.to_string(), AskAroundHandler::encode_breadcrumbs(&[]));
        let message = Message {
            source: id(b"asker"),
            destination: ctx.local_id.clone(),
            previous_hop: id(b"asker"),
            next_hop: ctx.local_id.clone(),
            command: COMMAND.to_vec(),
            kind: Kind::Request,
            message_id: 1,
            time_to_live: ctx.default_ttl(),
            payload,
        };
        let reply = handler.on_request(&ctx, &message).expect("reply expected");
        assert_eq!(reply.0, p2p0mq_proto::Priority::Fast);
    }

    #[test]
    fn on_reply_adopts_shorter_breadcrumb_path_only() {
        let ctx = ctx(TestClock::new(1000));
        let mut target = Peer::new(id(b"target"), None, None, None);
        target.set_state(PeerState::Unreachable);
        ctx.peers.insert(target);

        let mut handler = AskAroundHandler::new();
        let long_reply = Message {
            source: id(b"target"),
            destination: ctx.local_id.clone(),
            previous_hop: id(b"relay-far"),
            next_hop: ctx.local_id.clone(),
            command: COMMAND.to_vec(),
            kind: Kind::Reply,
            message_id: 1,
            time_to_live: ctx.default_ttl(),
            payload: {
                let mut p = Payload::new();
                p.insert(TARGET_KEY.to_string(), Value::Binary(id(b"target").as_bytes().to_vec()));
                p.insert(
                    BREADCRUMBS_KEY.to_string(),
                    AskAroundHandler::encode_breadcrumbs(&[id(b"hop1"), id(b"hop2")]),
                );
                p
            },
        };
        handler.on_reply(&ctx, &long_reply);
        assert_eq!(
            ctx.peers.clone_peer(&id(b"target")).unwrap().via,
            Some(id(b"relay-far"))
        );
        assert_eq!(ctx.peers.clone_peer(&id(b"target")).unwrap().state(), PeerState::Routed);

        let short_reply = Message {
            previous_hop: id(b"relay-near"),
            payload: {
                let mut p = Payload::new();
                p.insert(TARGET_KEY.to_string(), Value::Binary(id(b"target").as_bytes().to_vec()));
                p.insert(
                    BREADCRUMBS_KEY.to_string(),
                    AskAroundHandler::encode_breadcrumbs(&[id(b"hop1")]),
                );
                p
            },
            ..long_reply.clone()
        };
        handler.on_reply(&ctx, &short_reply);
        assert_eq!(
            ctx.peers.clone_peer(&id(b"target")).unwrap().via,
            Some(id(b"relay-near")),
            "a shorter breadcrumb path must override a longer prior one"
        );

        let equal_length_reply = Message {
            previous_hop: id(b"relay-other"),
            ..short_reply.clone()
        };
        handler.on_reply(&ctx, &equal_length_reply);
        assert_eq!(
            ctx.peers.clone_peer(&id(b"target")).unwrap().via,
            Some(id(b"relay-near")),
            "equal-length replies keep the first-wins relay"
        );
    }
}
