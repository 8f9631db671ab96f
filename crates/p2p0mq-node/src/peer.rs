use p2p0mq_proto::{Message, NodeId, Timestamp};

use crate::config::NodeConfig;

/// §4.2 peer state machine. Mirrors the original `conn_state`
/// constants one-to-one (kept here as plain variants rather than
/// magic integers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    Initial,
    Connecting,
    Connected,
    Routed,
    Unreachable,
    NoConnection,
}

impl PeerState {
    /// `state ∈ {INITIAL, NO_CONNECTION, UNREACHABLE} ⇔ "needs reconnect"`
    pub fn needs_reconnect(self) -> bool {
        matches!(
            self,
            PeerState::Initial | PeerState::NoConnection | PeerState::Unreachable
        )
    }

    /// `state ∈ {CONNECTED, ROUTED, UNREACHABLE} ⇔ "heart-beats"`
    pub fn does_heart_beat(self) -> bool {
        matches!(
            self,
            PeerState::Connected | PeerState::Routed | PeerState::Unreachable
        )
    }
}

/// In-memory record for one remote node (§3). Only `uuid`, `host` and
/// `port` round-trip through the repository — state, heart-beat
/// timers and `via` are ephemeral and reset on reload.
#[derive(Debug, Clone)]
pub struct Peer {
    pub id: NodeId,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_id: Option<i64>,

    state: PeerState,
    pub via: Option<NodeId>,

    pub next_hb: Option<Timestamp>,
    pub last_hb: Option<Timestamp>,
    pub hb_slowdown_secs: u64,

    pub next_ask_around: Option<Timestamp>,
    pub last_ask_around: Option<Timestamp>,

    /// Breadcrumb length of the ask-around reply that last set `via`.
    /// Used only to tie-break a shorter path over a later, longer one
    /// (§4.6); irrelevant once the peer is directly `CONNECTED`.
    pub via_hop_count: Option<usize>,

    /// Set by the connector when a connect message for this peer has
    /// already been handed to the sender's connection queue, so
    /// `tick()` does not enqueue a second one while the first is in
    /// flight.
    pub connect_pending: bool,
}

impl Peer {
    pub fn new(id: NodeId, host: Option<String>, port: Option<u16>, db_id: Option<i64>) -> Self {
        Self {
            id,
            host,
            port,
            db_id,
            state: PeerState::Initial,
            via: None,
            next_hb: None,
            last_hb: None,
            hb_slowdown_secs: 0,
            next_ask_around: None,
            last_ask_around: None,
            via_hop_count: None,
            connect_pending: false,
        }
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// `host`/`port` combined into a transport address, or `None` if
    /// the route is unknown.
    pub fn address(&self) -> Option<String> {
        let host = self.host.as_ref()?;
        match self.port {
            Some(port) => Some(format!("tcp://{host}:{port}")),
            None => Some(host.clone()),
        }
    }

    /// Direct-vs-relay transition rule used by the connector and
    /// heart-beat handlers on inbound connect/heart-beat
    /// request-or-reply: `CONNECTED` if the message came straight
    /// from its source, `ROUTED` (with `via`) otherwise.
    ///
    /// Panics if `message.source != self.id` — callers must look the
    /// peer up by the message's source before calling this.
    pub fn become_connected(&mut self, message: &Message, config: &NodeConfig, now: Timestamp) {
        assert_eq!(message.source, self.id, "become_connected source mismatch");
        if message.source == message.previous_hop {
            self.state = PeerState::Connected;
            self.via = None;
            self.via_hop_count = None;
        } else {
            self.state = PeerState::Routed;
            self.via = Some(message.previous_hop.clone());
            // A direct connect/heart-beat observation outranks any
            // ask-around inference, so it is recorded as a zero-hop path.
            self.via_hop_count = Some(0);
        }
        self.reset_heart_beat(config, now);
    }

    pub fn reset_heart_beat(&mut self, config: &NodeConfig, now: Timestamp) {
        self.next_hb = Some(now + config.heart_beat_interval.as_secs());
        self.hb_slowdown_secs = 0;
        self.last_hb = Some(now);
    }

    pub fn schedule_heart_beat(&mut self, config: &NodeConfig, now: Timestamp) {
        self.next_hb = Some(now + config.heart_beat_interval.as_secs() + self.hb_slowdown_secs);
        self.hb_slowdown_secs = (self.hb_slowdown_secs + config.heart_beat_slow_down.as_secs())
            .min(config.heart_beat_max_interval.as_secs());
    }

    pub fn set_state(&mut self, state: PeerState) {
        self.state = state;
    }

    pub fn set_via(&mut self, via: Option<NodeId>) {
        self.via = via;
    }

    /// Declares the peer unreachable via a transport failure
    /// (connect failed, send failed, message dropped): always lands
    /// on `NO_CONNECTION` regardless of the prior state, and schedules
    /// the reconnect attempt per §4.2.
    pub fn declare_no_connection(&mut self, config: &NodeConfig, now: Timestamp) {
        self.state = PeerState::NoConnection;
        self.via = None;
        self.connect_pending = false;
        self.next_hb = Some(now + config.unresponsive_reconnect_wait.as_secs());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    #[test]
    fn needs_reconnect_matches_spec_set() {
        assert!(PeerState::Initial.needs_reconnect());
        assert!(PeerState::NoConnection.needs_reconnect());
        assert!(PeerState::Unreachable.needs_reconnect());
        assert!(!PeerState::Connected.needs_reconnect());
        assert!(!PeerState::Routed.needs_reconnect());
        assert!(!PeerState::Connecting.needs_reconnect());
    }

    #[test]
    fn does_heart_beat_matches_spec_set() {
        assert!(PeerState::Connected.does_heart_beat());
        assert!(PeerState::Routed.does_heart_beat());
        assert!(PeerState::Unreachable.does_heart_beat());
        assert!(!PeerState::Initial.does_heart_beat());
        assert!(!PeerState::NoConnection.does_heart_beat());
        assert!(!PeerState::Connecting.does_heart_beat());
    }

    #[test]
    fn become_connected_direct_vs_relay() {
        let config = NodeConfig::default();
        let mut peer = Peer::new(id(b"peer"), None, None, None);

        let direct = Message {
            source: id(b"peer"),
            destination: id(b"self"),
            previous_hop: id(b"peer"),
            next_hop: id(b"self"),
            command: b"hello".to_vec(),
            kind: p2p0mq_proto::Kind::Request,
            message_id: 1,
            time_to_live: 1000,
            payload: Default::default(),
        };
        peer.become_connected(&direct, &config, 100);
        assert_eq!(peer.state(), PeerState::Connected);
        assert!(peer.via.is_none());

        let mut peer2 = Peer::new(id(b"peer"), None, None, None);
        let relayed = Message {
            previous_hop: id(b"relay"),
            ..direct
        };
        peer2.become_connected(&relayed, &config, 100);
        assert_eq!(peer2.state(), PeerState::Routed);
        assert_eq!(peer2.via, Some(id(b"relay")));
    }

    #[test]
    fn hb_slowdown_caps_at_max_interval() {
        let config = NodeConfig::default();
        let mut peer = Peer::new(id(b"peer"), None, None, None);
        for _ in 0..100 {
            peer.schedule_heart_beat(&config, 0);
        }
        assert!(peer.hb_slowdown_secs <= config.heart_beat_max_interval.as_secs());
    }
}
