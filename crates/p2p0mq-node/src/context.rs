use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use p2p0mq_proto::{Message, NodeId, Priority};

use crate::clock::Clock;
use crate::config::NodeConfig;
use crate::peer::Peer;
use crate::peer_table::PeerTable;
use crate::queues::{ConnectionQueue, PriorityQueues};
use crate::telemetry::TelemetryHook;

/// Per-node, monotonically increasing message id counter. §9 flags
/// the original's process-wide global as a design smell; this is
/// owned by exactly one `Node` and only used to correlate local
/// replies, never compared across nodes.
#[derive(Default)]
pub struct MessageIdCounter(AtomicU64);

impl MessageIdCounter {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Everything a handler needs, passed explicitly at every hook call
/// instead of reached through a process-wide global (§9). Cheap to
/// clone — every field is an `Arc` or `Copy` value.
#[derive(Clone)]
pub struct NodeContext {
    pub local_id: NodeId,
    pub config: Arc<NodeConfig>,
    pub clock: Arc<dyn Clock>,
    pub peers: Arc<PeerTable>,
    pub outbound: Arc<PriorityQueues>,
    pub connections: Arc<ConnectionQueue>,
    pub message_ids: Arc<MessageIdCounter>,
    pub telemetry: Arc<dyn TelemetryHook>,
}

impl NodeContext {
    pub fn now(&self) -> p2p0mq_proto::Timestamp {
        self.clock.now()
    }

    pub fn next_message_id(&self) -> u64 {
        self.message_ids.next()
    }

    pub fn enqueue(&self, priority: Priority, message: Message) {
        self.outbound.enqueue(priority, message);
    }

    pub fn enqueue_connect(&self, peer: Peer, message: Message) {
        self.connections.enqueue(peer, message);
    }

    pub fn default_ttl(&self) -> p2p0mq_proto::Timestamp {
        self.now() + self.config.default_time_to_live.as_secs()
    }
}
