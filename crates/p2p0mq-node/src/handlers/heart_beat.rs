//! Heart-beat handler (command `hb`, §4.5), grounded on
//! `HeartBeatConcern` in the original source.

use p2p0mq_proto::{Kind, Message, Payload};

use crate::context::NodeContext;
use crate::handler::{Handler, HandlerReply};
use crate::peer::PeerState;

pub const COMMAND: &[u8] = b"hb";

#[derive(Default)]
pub struct HeartBeatHandler;

impl HeartBeatHandler {
    pub fn new() -> Self {
        Self
    }

    fn compose_request(&self, ctx: &NodeContext, peer: &crate::peer::Peer) -> Message {
        let next_hop = if peer.state() == PeerState::Connected {
            peer.id.clone()
        } else {
            peer.via.clone().unwrap_or_else(|| peer.id.clone())
        };
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
}

impl Handler for HeartBeatHandler {
    fn command_id(&self) -> &'static [u8] {
        COMMAND
    }

    fn tick(&mut self, ctx: &NodeContext) {
        let now = ctx.now();
        for peer in ctx.peers.snapshot() {
            if !peer.state().does_heart_beat() {
                continue;
            }
            if peer.next_hb.map_or(true, |t| t > now) {
                continue;
            }

            let no_connection = peer
                .last_hb
                .is_some_and(|t| t + ctx.config.no_connection_threshold.as_secs() < now);
            if no_connection {
                ctx.peers.with_peer_mut(&peer.id, |p| p.set_state(PeerState::NoConnection));
                continue;
            }

            let unresponsive = peer
                .last_hb
                .is_some_and(|t| t + ctx.config.unresponsive_threshold.as_secs() < now);
            if unresponsive {
                ctx.peers.with_peer_mut(&peer.id, |p| p.set_state(PeerState::Unreachable));
            }

            let message = ctx
                .peers
                .with_peer_mut(&peer.id, |p| {
                    p.schedule_heart_beat(&ctx.config, now);
                    self.compose_request(ctx, p)
                })
                .expect("peer present, just looked up from snapshot");
            ctx.enqueue(p2p0mq_proto::Priority::Fast, message);
        }
    }

    fn on_request(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let now = ctx.now();
        let known = ctx
            .peers
            .with_peer_mut(&message.source, |peer| {
                peer.become_connected(message, &ctx.config, now);
            })
            .is_some();
        if !known {
            tracing::warn!(peer = %message.source, "heart-beat request from unknown peer");
            return None;
        }
        Some((
            p2p0mq_proto::Priority::Fast,
            message.reply_to(ctx.local_id.clone(), Kind::Reply, Payload::new(), ctx.default_ttl()),
        ))
    }

    fn on_reply(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let now = ctx.now();
        let known = ctx
            .peers
            .with_peer_mut(&message.source, |peer| {
                peer.become_connected(message, &ctx.config, now);
            })
            .is_some();
        if !known {
            tracing::warn!(peer = %message.source, "heart-beat reply from unknown peer");
        }
        None
    }
}
