//! Sender worker loop (§4.9): owns the outbound side of the transport.
//! `on_sent`, `on_send_failed` and `on_dropped` always run on this
//! thread (§5), so the handler registry is shared with the app worker
//! behind a mutex rather than owned by either.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use p2p0mq_proto::{Message, Priority};
use parking_lot::Mutex;

use crate::context::NodeContext;
use crate::error::TransportError;
use crate::handler::HandlerRegistry;
use crate::transport::Transport;
use crate::wake::WakeSignal;

const IDLE_POLL: Duration = Duration::from_millis(200);

pub struct SenderWorker {
    ctx: NodeContext,
    registry: Arc<Mutex<HandlerRegistry>>,
    transport: Arc<dyn Transport>,
    stop: Arc<AtomicBool>,
    wake: WakeSignal,
    loop_counter: Arc<AtomicU64>,
}

impl SenderWorker {
    pub fn new(
        ctx: NodeContext,
        registry: Arc<Mutex<HandlerRegistry>>,
        transport: Arc<dyn Transport>,
        stop: Arc<AtomicBool>,
        wake: WakeSignal,
        loop_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            ctx,
            registry,
            transport,
            stop,
            wake,
            loop_counter,
        }
    }

    pub fn run(self) {
        while !self.stop.load(Ordering::Relaxed) {
            let did_work = self.run_once();
            self.loop_counter.fetch_add(1, Ordering::Relaxed);
            if !did_work {
                self.wake.wait(IDLE_POLL);
            }
        }
        if let Err(error) = self.transport.close_sender() {
            tracing::error!(%error, "failed to close sender transport on shutdown");
        }
    }

    fn run_once(&self) -> bool {
        let mut did_work = self.connect_peers();

        let limit = self.ctx.config.process_limit_per_loop;
        for (priority, message) in self.ctx.outbound.dequeue(limit) {
            did_work = true;
            self.send_one(priority, message);
        }
        did_work
    }

    fn connect_peers(&self) -> bool {
        let pending = self.ctx.connections.drain();
        let did_work = !pending.is_empty();
        for (peer, message) in pending {
            let Some(address) = peer.address() else {
                continue;
            };
            match self.transport.ensure_peer_connection(&peer.id, &address) {
                Ok(()) => self.ctx.enqueue(Priority::Fast, message),
                Err(error) => {
                    self.call_on_send_failed(message, &error);
                }
            }
        }
        did_work
    }

    fn send_one(&self, priority: Priority, message: Message) {
        let now = self.ctx.now();
        if message.time_to_live <= now {
            self.call_on_dropped(&message);
            return;
        }
        if let Err(error) = message.valid_for_send(now) {
            tracing::error!(
                %error,
                message_id = message.message_id,
                "message failed validation at send time; dropping"
            );
            return;
        }

        let frames = match p2p0mq_proto::encode(&message, &self.ctx.local_id) {
            Ok(frames) => frames,
            Err(error) => {
                tracing::error!(%error, message_id = message.message_id, "failed to encode message; dropping");
                return;
            }
        };

        match self.transport.send(&message.next_hop, frames) {
            Ok(()) => {
                self.ctx.telemetry.on_message_sent(&message);
                self.call_on_sent(&message);
            }
            Err(error) => {
                let now = self.ctx.now();
                if message.time_to_live > now {
                    if let Some(requeued) = self.call_on_send_failed(message, &error) {
                        self.ctx.enqueue(priority, requeued);
                    }
                } else {
                    self.call_on_dropped(&message);
                }
            }
        }
    }

    fn call_on_sent(&self, message: &Message) {
        let mut registry = self.registry.lock();
        if let Some(handler) = registry.get_mut(&message.command) {
            let ctx = &self.ctx;
            if panic::catch_unwind(AssertUnwindSafe(|| handler.on_sent(ctx, message))).is_err() {
                tracing::error!(message_id = message.message_id, "handler panicked in on_sent");
            }
        }
    }

    fn call_on_send_failed(&self, message: Message, error: &TransportError) -> Option<Message> {
        let mut registry = self.registry.lock();
        let command = message.command.clone();
        let handler = registry.get_mut(&command)?;
        let ctx = &self.ctx;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.on_send_failed(ctx, message, error))) {
            Ok(requeue) => requeue,
            Err(_) => {
                tracing::error!(
                    command = %String::from_utf8_lossy(&command),
                    "handler panicked in on_send_failed"
                );
                None
            }
        }
    }

    fn call_on_dropped(&self, message: &Message) {
        self.ctx.telemetry.on_message_dropped(message);
        let mut registry = self.registry.lock();
        if let Some(handler) = registry.get_mut(&message.command) {
            let ctx = &self.ctx;
            if panic::catch_unwind(AssertUnwindSafe(|| handler.on_dropped(ctx, message))).is_err() {
                tracing::error!(message_id = message.message_id, "handler panicked in on_dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certstore::InMemoryCertStore;
    use crate::clock::TestClock;
    use crate::config::NodeConfig;
    use crate::context::MessageIdCounter;
    use crate::handler::{Handler, HandlerReply};
    use crate::peer::Peer;
    use crate::peer_table::PeerTable;
    use crate::queues::{ConnectionQueue, PriorityQueues};
    use crate::telemetry::NullTelemetry;
    use crate::transport::ZmqTransport;
    use p2p0mq_proto::{Kind, NodeId, Payload};

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    struct DroppedFlag(Arc<std::sync::atomic::AtomicBool>);
    impl Handler for DroppedFlag {
        fn command_id(&self) -> &'static [u8] {
            b"echo"
        }
        fn on_dropped(&mut self, _ctx: &NodeContext, _message: &Message) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn sender(registry: HandlerRegistry) -> SenderWorker {
        let wake = WakeSignal::new();
        let ctx = NodeContext {
            local_id: id(b"local"),
            config: Arc::new(NodeConfig::default()),
            clock: Arc::new(TestClock::new(1000)),
            peers: Arc::new(PeerTable::new()),
            outbound: Arc::new(PriorityQueues::new(wake.clone())),
            connections: Arc::new(ConnectionQueue::new(wake.clone())),
            message_ids: Arc::new(MessageIdCounter::default()),
            telemetry: Arc::new(NullTelemetry),
        };
        let transport = Arc::new(ZmqTransport::new(id(b"local"), Arc::new(InMemoryCertStore::new()), false));
        SenderWorker::new(
            ctx,
            Arc::new(Mutex::new(registry)),
            transport,
            Arc::new(AtomicBool::new(false)),
            wake,
            Arc::new(AtomicU64::new(0)),
        )
    }

    fn message(ttl: u64) -> Message {
        Message {
            source: id(b"local"),
            destination: id(b"remote"),
            previous_hop: id(b"local"),
            next_hop: id(b"remote"),
            command: b"echo".to_vec(),
            kind: Kind::Request,
            message_id: 1,
            time_to_live: ttl,
            payload: Payload::new(),
        }
    }

    #[test]
    fn expired_ttl_invokes_on_dropped_and_never_touches_transport() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(DroppedFlag(flag.clone())));
        let worker = sender(registry);
        worker.send_one(Priority::Fast, message(1));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn send_without_a_connection_is_treated_as_a_transport_failure() {
        let flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        struct RecordSendFailed(Arc<std::sync::atomic::AtomicBool>);
        impl Handler for RecordSendFailed {
            fn command_id(&self) -> &'static [u8] {
                b"echo"
            }
            fn on_send_failed(
                &mut self,
                _ctx: &NodeContext,
                _message: Message,
                _error: &TransportError,
            ) -> Option<Message> {
                self.0.store(true, Ordering::SeqCst);
                None
            }
        }
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(RecordSendFailed(flag.clone())));
        let worker = sender(registry);
        worker.send_one(Priority::Fast, message(9999));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn requeued_send_failure_keeps_its_original_priority() {
        struct AlwaysRetry;
        impl Handler for AlwaysRetry {
            fn command_id(&self) -> &'static [u8] {
                b"echo"
            }
            fn on_send_failed(
                &mut self,
                _ctx: &NodeContext,
                message: Message,
                _error: &TransportError,
            ) -> Option<Message> {
                Some(message)
            }
        }
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(AlwaysRetry));
        let worker = sender(registry);
        worker.send_one(Priority::Slow, message(9999));

        let requeued = worker.ctx.outbound.dequeue(10);
        assert_eq!(requeued.len(), 1);
        assert_eq!(requeued[0].0, Priority::Slow, "retry must re-enqueue at the message's original priority");
    }

    #[test]
    fn connect_peers_drains_the_connection_queue() {
        let registry = HandlerRegistry::new();
        let worker = sender(registry);
        let peer = Peer::new(id(b"remote"), Some("127.0.0.1".into()), Some(8499), None);
        worker.ctx.enqueue_connect(peer, message(9999));
        assert!(worker.connect_peers());
        assert!(worker.ctx.connections.is_empty());
    }
}
