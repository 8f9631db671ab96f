//! Connector handler (command `hello`, §4.4), grounded on
//! `ConnectorConcern` in the original source: drives `INITIAL`/
//! `NO_CONNECTION` peers into `CONNECTED`/`ROUTED`.

use p2p0mq_proto::{Kind, Message, Payload};
use rmpv::Value;

use crate::context::NodeContext;
use crate::handler::{Handler, HandlerReply};
use crate::peer::{Peer, PeerState};

pub const COMMAND: &[u8] = b"hello";

pub struct ConnectorHandler {
    receiver_host: String,
    receiver_port: u16,
}

impl ConnectorHandler {
    pub fn new(receiver_host: impl Into<String>, receiver_port: u16) -> Self {
        Self {
            receiver_host: receiver_host.into(),
            receiver_port,
        }
    }

    fn our_address_payload(&self) -> Payload {
        let mut payload = Payload::new();
        payload.insert("host".to_string(), Value::from(self.receiver_host.clone()));
        payload.insert("port".to_string(), Value::from(self.receiver_port as u64));
        payload
    }

    fn compose_connect(&self, ctx: &NodeContext, peer: &Peer) -> Message {
        Message {
            source: ctx.local_id.clone(),
            destination: peer.id.clone(),
            previous_hop: ctx.local_id.clone(),
            next_hop: peer.id.clone(),
            command: COMMAND.to_vec(),
            kind: Kind::Request,
            message_id: ctx.next_message_id(),
            time_to_live: ctx.default_ttl(),
            payload: self.our_address_payload(),
        }
    }

    fn connect_peer(&self, ctx: &NodeContext, peer: &mut Peer, first: bool) {
        if peer.next_hb.is_some() && first {
            return;
        }
        let message = self.compose_connect(ctx, peer);
        if first {
            peer.next_hb = Some(ctx.now() + ctx.config.unresponsive_threshold.as_secs());
            peer.hb_slowdown_secs = 0;
        } else {
            peer.schedule_heart_beat(&ctx.config, ctx.now());
        }
        peer.connect_pending = true;
        ctx.enqueue_connect(peer.clone(), message);
    }

    fn host_port_from_payload(payload: &Payload) -> (Option<String>, Option<u16>) {
        let host = payload
            .get("host")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let port = payload
            .get("port")
            .and_then(|v| v.as_u64())
            .map(|p| p as u16);
        (host, port)
    }
}

impl Handler for ConnectorHandler {
    fn command_id(&self) -> &'static [u8] {
        COMMAND
    }

    fn tick(&mut self, ctx: &NodeContext) {
        let now = ctx.now();
        let peers = ctx.peers.snapshot();
        for peer in peers {
            if peer.host.is_none() {
                continue;
            }
            match peer.state() {
                PeerState::Connecting => {
                    if peer.next_hb.is_some_and(|t| t < now) {
                        ctx.peers.with_peer_mut(&peer.id, |p| {
                            p.declare_no_connection(&ctx.config, now);
                        });
                    }
                }
                PeerState::Initial => {
                    ctx.peers.with_peer_mut(&peer.id, |p| {
                        self.connect_peer(ctx, p, true);
                    });
                }
                PeerState::NoConnection => {
                    if peer.next_hb.is_some_and(|t| t < now) {
                        ctx.peers.with_peer_mut(&peer.id, |p| {
                            self.connect_peer(ctx, p, false);
                        });
                    }
                }
                _ => {}
            }
        }
    }

    fn on_request(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let (host, port) = Self::host_port_from_payload(&message.payload);
        let now = ctx.now();

        if !ctx.peers.contains(&message.source) {
            ctx.peers.insert(Peer::new(message.source.clone(), host.clone(), port, None));
        }

        ctx.peers.with_peer_mut(&message.source, |peer| {
            peer.host = host;
            peer.port = port;
            peer.last_hb = Some(now);
            if peer.state().needs_reconnect() {
                self.connect_peer(ctx, peer, true);
            } else {
                peer.become_connected(message, &ctx.config, now);
            }
        });

        Some((
            p2p0mq_proto::Priority::Fast,
            message.reply_to(ctx.local_id.clone(), Kind::Reply, self.our_address_payload(), ctx.default_ttl()),
        ))
    }

    fn on_reply(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
        let (host, port) = Self::host_port_from_payload(&message.payload);
        let now = ctx.now();
        ctx.peers.with_peer_mut(&message.source, |peer| {
            peer.host = host;
            peer.port = port;
            peer.become_connected(message, &ctx.config, now);
        });
        None
    }

    fn on_sent(&mut self, ctx: &NodeContext, message: &Message) {
        ctx.peers.with_peer_mut(&message.destination, |peer| {
            peer.set_state(PeerState::Connecting);
        });
    }

    fn on_send_failed(
        &mut self,
        ctx: &NodeContext,
        message: Message,
        _error: &crate::error::TransportError,
    ) -> Option<Message> {
        let now = ctx.now();
        ctx.peers.with_peer_mut(&message.destination, |peer| {
            peer.declare_no_connection(&ctx.config, now);
        });
        // The connect queue is special-cased by the sender; unlike
        // other handlers, returning a message here would be incorrect.
        None
    }

    fn on_dropped(&mut self, ctx: &NodeContext, message: &Message) {
        let now = ctx.now();
        ctx.peers.with_peer_mut(&message.destination, |peer| {
            peer.declare_no_connection(&ctx.config, now);
        });
    }
}
