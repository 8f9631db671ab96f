//! App worker loop (§4.8): the orchestrator thread. Reconciles the
//! peer table with the repository, ticks every handler, and dispatches
//! drained inbound messages before handing the results to the sender.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use p2p0mq_proto::{Kind, Message, Priority};
use parking_lot::Mutex;

use crate::context::NodeContext;
use crate::handler::HandlerRegistry;
use crate::handlers::AskAroundHandler;
use crate::queues::TypedInboundQueues;
use crate::repository::PeerRepository;
use crate::router;
use crate::wake::WakeSignal;

/// How long the app worker sleeps when a loop produced no work. Short
/// enough that scheduled heart-beats and ask-around sweeps still fire
/// close to on time even with no inbound traffic to wake it early.
const IDLE_POLL: Duration = Duration::from_millis(200);

pub struct AppWorker {
    ctx: NodeContext,
    registry: Arc<Mutex<HandlerRegistry>>,
    ask_around: AskAroundHandler,
    inbound: Arc<TypedInboundQueues>,
    repository: Arc<dyn PeerRepository>,
    stop: Arc<AtomicBool>,
    wake: WakeSignal,
    last_sync: u64,
    loop_counter: Arc<AtomicU64>,
}

impl AppWorker {
    pub fn new(
        ctx: NodeContext,
        registry: Arc<Mutex<HandlerRegistry>>,
        ask_around: AskAroundHandler,
        inbound: Arc<TypedInboundQueues>,
        repository: Arc<dyn PeerRepository>,
        stop: Arc<AtomicBool>,
        wake: WakeSignal,
        loop_counter: Arc<AtomicU64>,
    ) -> Self {
        Self {
            ctx,
            registry,
            ask_around,
            inbound,
            repository,
            stop,
            wake,
            last_sync: 0,
            loop_counter,
        }
    }

    pub fn run(mut self) {
        self.registry.lock().start_all(&self.ctx);
        while !self.stop.load(Ordering::Relaxed) {
            let processed = self.run_once();
            self.loop_counter.fetch_add(1, Ordering::Relaxed);
            self.ctx.telemetry.on_loop(processed);
            if processed == 0 {
                self.wake.wait(IDLE_POLL);
            }
        }
        self.registry.lock().stop_all(&self.ctx);
    }

    /// One app-loop pass. Returns the number of inbound messages
    /// handled, used by the caller to decide whether to sleep.
    fn run_once(&mut self) -> usize {
        self.maybe_sync_repository();
        self.registry.lock().tick_all(&self.ctx);

        let limit = self.ctx.config.process_limit_per_loop;
        let mut processed = 0usize;

        for message in self.inbound.drain(Kind::Request, limit) {
            processed += 1;
            if let Some((priority, reply)) = self.dispatch_request(&message) {
                self.ctx.enqueue(priority, reply);
            }
        }
        for message in self.inbound.drain(Kind::Reply, limit) {
            processed += 1;
            if let Some((priority, reply)) = self.dispatch_reply(&message) {
                self.ctx.enqueue(priority, reply);
            }
        }
        for message in self.inbound.drain(Kind::Route, limit) {
            processed += 1;
            let outcome = router::process_route(&self.ctx, &self.ask_around, message);
            for (priority, forwarded) in outcome.forwarded.into_iter().chain(outcome.discovery) {
                self.ctx.enqueue(priority, forwarded);
            }
        }

        processed
    }

    fn maybe_sync_repository(&mut self) {
        let now = self.ctx.now();
        if now.saturating_sub(self.last_sync) < self.ctx.config.sync_db_interval.as_secs() {
            return;
        }
        self.last_sync = now;
        match crate::sync::sync_database(&self.ctx.peers, self.repository.as_ref()) {
            Ok((loaded, saved)) => {
                if loaded > 0 || saved > 0 {
                    tracing::debug!(loaded, saved, "repository reconciled");
                }
            }
            Err(error) => tracing::error!(%error, "repository sync failed"),
        }
    }

    fn dispatch_request(&mut self, message: &Message) -> Option<(Priority, Message)> {
        let mut registry = self.registry.lock();
        let command = message.command.clone();
        let handler = match registry.get_mut(&command) {
            Some(h) => h,
            None => {
                tracing::warn!(command = %String::from_utf8_lossy(&command), "no handler registered for command");
                return None;
            }
        };
        let ctx = &self.ctx;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.on_request(ctx, message))) {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!(
                    command = %String::from_utf8_lossy(&command),
                    message_id = message.message_id,
                    "handler panicked in on_request; message dropped"
                );
                None
            }
        }
    }

    fn dispatch_reply(&mut self, message: &Message) -> Option<(Priority, Message)> {
        let mut registry = self.registry.lock();
        let command = message.command.clone();
        let handler = match registry.get_mut(&command) {
            Some(h) => h,
            None => {
                tracing::warn!(command = %String::from_utf8_lossy(&command), "no handler registered for command");
                return None;
            }
        };
        let ctx = &self.ctx;
        match panic::catch_unwind(AssertUnwindSafe(|| handler.on_reply(ctx, message))) {
            Ok(reply) => reply,
            Err(_) => {
                tracing::error!(
                    command = %String::from_utf8_lossy(&command),
                    message_id = message.message_id,
                    "handler panicked in on_reply; message dropped"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::config::NodeConfig;
    use crate::context::MessageIdCounter;
    use crate::handler::{Handler, HandlerReply};
    use crate::peer_table::PeerTable;
    use crate::queues::{ConnectionQueue, PriorityQueues};
    use crate::repository::InMemoryPeerRepository;
    use crate::telemetry::NullTelemetry;
    use p2p0mq_proto::{NodeId, Payload};

    struct PanickingHandler;
    impl Handler for PanickingHandler {
        fn command_id(&self) -> &'static [u8] {
            b"boom"
        }
        fn on_request(&mut self, _ctx: &NodeContext, _message: &Message) -> HandlerReply {
            panic!("handler exploded");
        }
    }

    struct EchoHandler;
    impl Handler for EchoHandler {
        fn command_id(&self) -> &'static [u8] {
            b"echo"
        }
        fn on_request(&mut self, ctx: &NodeContext, message: &Message) -> HandlerReply {
            Some((
                Priority::Fast,
                message.reply_to(ctx.local_id.clone(), Kind::Reply, Payload::new(), ctx.default_ttl()),
            ))
        }
    }

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    fn worker(registry: HandlerRegistry) -> AppWorker {
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
        AppWorker::new(
            ctx,
            Arc::new(Mutex::new(registry)),
            AskAroundHandler::new(),
            Arc::new(TypedInboundQueues::new(wake.clone())),
            Arc::new(InMemoryPeerRepository::new()),
            Arc::new(AtomicBool::new(false)),
            wake,
            Arc::new(AtomicU64::new(0)),
        )
    }

    fn request(command: &[u8]) -> Message {
        Message {
            source: id(b"remote"),
            destination: id(b"local"),
            previous_hop: id(b"remote"),
            next_hop: id(b"local"),
            command: command.to_vec(),
            kind: Kind::Request,
            message_id: 1,
            time_to_live: 9999,
            payload: Payload::new(),
        }
    }

    #[test]
    fn a_panicking_handler_is_caught_and_logged() {
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(PanickingHandler));
        let mut app = worker(registry);
        app.inbound.push(request(b"boom"));
        let processed = app.run_once();
        assert_eq!(processed, 1);
    }

    #[test]
    fn dispatch_request_enqueues_the_handlers_reply() {
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(EchoHandler));
        let mut app = worker(registry);
        app.inbound.push(request(b"echo"));
        app.run_once();
        assert!(!app.ctx.outbound.is_empty());
    }

    #[test]
    fn process_limit_per_loop_bounds_messages_handled() {
        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(EchoHandler));
        let mut app = worker(registry);
        app.ctx.config = Arc::new(NodeConfig {
            process_limit_per_loop: 2,
            ..NodeConfig::default()
        });
        for _ in 0..5 {
            app.inbound.push(request(b"echo"));
        }
        let processed = app.run_once();
        assert_eq!(processed, 2);
    }

    #[test]
    fn unknown_command_is_logged_and_dropped_without_panicking() {
        let app_registry = HandlerRegistry::new();
        let mut app = worker(app_registry);
        app.inbound.push(request(b"nobody-home"));
        let processed = app.run_once();
        assert_eq!(processed, 1);
        assert!(app.ctx.outbound.is_empty());
    }
}
