//! Receiver worker loop (§4.10): owns the inbound side of the
//! transport. Every frame is decoded and classified by `kind` before
//! being handed to the app worker via the typed inbound queues.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use p2p0mq_proto::NodeId;

use crate::context::NodeContext;
use crate::queues::TypedInboundQueues;
use crate::transport::Transport;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

pub struct ReceiverWorker {
    ctx: NodeContext,
    transport: Arc<dyn Transport>,
    inbound: Arc<TypedInboundQueues>,
    stop: Arc<AtomicBool>,
    loop_counter: Arc<AtomicU64>,
}

impl ReceiverWorker {
    pub fn new(
        ctx: NodeContext,
        transport: Arc<dyn Transport>,
        inbound: Arc<TypedInboundQueues>,
        stop: Arc<AtomicBool>,
        loop_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            ctx,
            transport,
            inbound,
            stop,
            loop_counter,
        }
    }

    pub fn run(self) {
        while !self.stop.load(Ordering::Relaxed) {
            match self.transport.recv_timeout(RECV_TIMEOUT) {
                Ok(Some((previous_hop, parts))) => self.handle_frame(previous_hop, parts),
                Ok(None) => {}
                Err(error) => tracing::error!(%error, "transport receive failed"),
            }
            self.loop_counter.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(error) = self.transport.close_receiver() {
            tracing::error!(%error, "failed to close receiver transport on shutdown");
        }
    }

    fn handle_frame(&self, previous_hop: NodeId, parts: Vec<Vec<u8>>) {
        let default_ttl = self.ctx.default_ttl();
        match p2p0mq_proto::decode(&parts, previous_hop, &self.ctx.local_id, default_ttl) {
            Ok(message) => self.inbound.push(message),
            Err(error) => tracing::warn!(%error, "dropping malformed frame"),
        }
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
    use p2p0mq_proto::Kind;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    fn ctx() -> NodeContext {
        let wake = WakeSignal::new();
        NodeContext {
            local_id: id(b"local"),
            config: Arc::new(NodeConfig::default()),
            clock: Arc::new(TestClock::new(1000)),
            peers: Arc::new(PeerTable::new()),
            outbound: Arc::new(PriorityQueues::new(wake.clone())),
            connections: Arc::new(ConnectionQueue::new(wake)),
            message_ids: Arc::new(MessageIdCounter::default()),
            telemetry: Arc::new(NullTelemetry),
        }
    }

    #[test]
    fn malformed_frame_is_dropped_without_enqueueing() {
        let ctx = ctx();
        let inbound = Arc::new(TypedInboundQueues::new(WakeSignal::new()));
        let worker = ReceiverWorker {
            ctx: ctx.clone(),
            transport: Arc::new(crate::transport::ZmqTransport::new(
                id(b"local"),
                Arc::new(crate::certstore::InMemoryCertStore::new()),
                false,
            )),
            inbound: inbound.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            loop_counter: Arc::new(AtomicU64::new(0)),
        };

        worker.handle_frame(id(b"peer"), vec![vec![1, 2, 3, 4]; 6]);
        assert!(inbound.is_empty());
    }

    #[test]
    fn well_formed_frame_is_classified_by_kind() {
        let ctx = ctx();
        let inbound = Arc::new(TypedInboundQueues::new(WakeSignal::new()));
        let worker = ReceiverWorker {
            ctx: ctx.clone(),
            transport: Arc::new(crate::transport::ZmqTransport::new(
                id(b"local"),
                Arc::new(crate::certstore::InMemoryCertStore::new()),
                false,
            )),
            inbound: inbound.clone(),
            stop: Arc::new(AtomicBool::new(false)),
            loop_counter: Arc::new(AtomicU64::new(0)),
        };

        let message = p2p0mq_proto::Message {
            source: id(b"peer"),
            destination: ctx.local_id.clone(),
            previous_hop: id(b"peer"),
            next_hop: ctx.local_id.clone(),
            command: b"hello".to_vec(),
            kind: Kind::Request,
            message_id: 1,
            time_to_live: 9999,
            payload: Default::default(),
        };
        let frames = p2p0mq_proto::encode(&message, &ctx.local_id).unwrap();
        worker.handle_frame(id(b"peer"), frames);

        assert_eq!(inbound.drain(Kind::Request, 10).len(), 1);
    }
}
