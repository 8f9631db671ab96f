//! Top-level node composition (§6, §9): owns the collaborators
//! (repository, cert store, transport), the shared handler registry,
//! and the three worker threads. Composition over the original's
//! multiple-inheritance `LocalPeer(PeerStore, SecurityManager,
//! ConcernsManager, Router, KoLoopThread)` — each concern here is a
//! field, not a base class.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use p2p0mq_proto::{Message, NodeId, Priority};
use parking_lot::Mutex;

use crate::certstore::CertStore;
use crate::clock::{Clock, SystemClock};
use crate::config::NodeConfig;
use crate::context::{MessageIdCounter, NodeContext};
use crate::error::NodeError;
use crate::handler::HandlerRegistry;
use crate::handlers::{AskAroundHandler, ByeHandler, ConnectorHandler, HeartBeatHandler};
use crate::peer::Peer;
use crate::peer_table::PeerTable;
use crate::queues::{ConnectionQueue, PriorityQueues, TypedInboundQueues};
use crate::repository::PeerRepository;
use crate::telemetry::TelemetryHook;
use crate::transport::Transport;
use crate::wake::WakeSignal;
use crate::workers::{AppWorker, ReceiverWorker, SenderWorker};

/// Minimum per-worker loop count the original `stable()` check requires
/// (`run_loop_counter > 4`) before a node reports itself stable.
const STABLE_LOOP_THRESHOLD: u64 = 4;

struct Workers {
    app: JoinHandle<()>,
    receiver: JoinHandle<()>,
    sender: JoinHandle<()>,
}

/// One mesh node. Built with [`Node::builder`], started with
/// [`Node::start`]; the administrative surface (`start`/`stop`/
/// `is_stable`/`add_peer`/`take_peer`/`exchange_certificates`/
/// `enqueue`) is the one named in §6 as required for tests, not a
/// user-facing CLI.
pub struct Node {
    ctx: NodeContext,
    registry: Arc<Mutex<HandlerRegistry>>,
    ask_around: AskAroundHandler,
    repository: Arc<dyn PeerRepository>,
    cert_store: Arc<dyn CertStore>,
    transport: Arc<dyn Transport>,
    receiver_address: String,
    inbound: Arc<TypedInboundQueues>,
    stop: Arc<AtomicBool>,
    wake: WakeSignal,

    app_loops: Arc<AtomicU64>,
    receiver_loops: Arc<AtomicU64>,
    sender_loops: Arc<AtomicU64>,

    workers: Mutex<Option<Workers>>,
}

pub struct NodeBuilder {
    local_id: NodeId,
    config: NodeConfig,
    clock: Arc<dyn Clock>,
    repository: Arc<dyn PeerRepository>,
    cert_store: Arc<dyn CertStore>,
    transport: Arc<dyn Transport>,
    telemetry: Arc<dyn TelemetryHook>,
    receiver_host: String,
    receiver_port: u16,
}

impl NodeBuilder {
    pub fn config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryHook>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn build(self) -> Node {
        let wake = WakeSignal::new();
        let ctx = NodeContext {
            local_id: self.local_id,
            config: Arc::new(self.config),
            clock: self.clock,
            peers: Arc::new(PeerTable::new()),
            outbound: Arc::new(PriorityQueues::new(wake.clone())),
            connections: Arc::new(ConnectionQueue::new(wake.clone())),
            message_ids: Arc::new(MessageIdCounter::default()),
            telemetry: self.telemetry,
        };

        let mut registry = HandlerRegistry::new();
        registry.add(Box::new(ConnectorHandler::new(
            self.receiver_host.clone(),
            self.receiver_port,
        )));
        registry.add(Box::new(HeartBeatHandler));
        // Dispatches inbound `r` REQUEST/REPLY traffic; the router
        // keeps its own stateless instance (below) purely to compose a
        // fresh discovery batch when it hits an unknown destination.
        registry.add(Box::new(AskAroundHandler::new()));
        registry.add(Box::new(ByeHandler::new()));

        Node {
            ctx,
            registry: Arc::new(Mutex::new(registry)),
            ask_around: AskAroundHandler::new(),
            repository: self.repository,
            cert_store: self.cert_store,
            transport: self.transport,
            receiver_address: format!("tcp://{}:{}", self.receiver_host, self.receiver_port),
            inbound: Arc::new(TypedInboundQueues::new(wake.clone())),
            stop: Arc::new(AtomicBool::new(false)),
            wake,
            app_loops: Arc::new(AtomicU64::new(0)),
            receiver_loops: Arc::new(AtomicU64::new(0)),
            sender_loops: Arc::new(AtomicU64::new(0)),
            workers: Mutex::new(None),
        }
    }
}

impl Node {
    #[allow(clippy::too_many_arguments)]
    pub fn builder(
        local_id: NodeId,
        receiver_host: impl Into<String>,
        receiver_port: u16,
        repository: Arc<dyn PeerRepository>,
        cert_store: Arc<dyn CertStore>,
        transport: Arc<dyn Transport>,
    ) -> NodeBuilder {
        NodeBuilder {
            local_id,
            config: NodeConfig::default(),
            clock: Arc::new(SystemClock),
            repository,
            cert_store,
            transport,
            telemetry: Arc::new(crate::telemetry::TracingTelemetry),
            receiver_host: receiver_host.into(),
            receiver_port,
        }
    }

    /// Registers an additional handler (beyond the built-in connector
    /// and heart-beat). Must be called before [`Node::start`]: the ask-
    /// around handler already registers itself via the router, not the
    /// registry, so it is not included here.
    pub fn register_handler(&self, handler: Box<dyn crate::handler::Handler>) {
        self.registry.lock().add(handler);
    }

    /// Generates (or loads) the local CURVE identity, binds the
    /// receiver socket, reconciles the peer table with the repository,
    /// and spawns the three worker threads. Only config/identity
    /// failures here are fatal (§7).
    pub fn start(&self) -> Result<(), NodeError> {
        self.cert_store
            .ensure_local_identity()
            .map_err(|e| NodeError::Startup(anyhow::anyhow!(e)))?;

        crate::sync::sync_database(&self.ctx.peers, self.repository.as_ref())
            .map_err(NodeError::Repository)?;

        self.transport.bind_receiver(&self.receiver_address)?;

        self.stop.store(false, Ordering::Relaxed);
        self.app_loops.store(0, Ordering::Relaxed);
        self.receiver_loops.store(0, Ordering::Relaxed);
        self.sender_loops.store(0, Ordering::Relaxed);

        let app = AppWorker::new(
            self.ctx.clone(),
            self.registry.clone(),
            AskAroundHandler::new(),
            self.inbound.clone(),
            self.repository.clone(),
            self.stop.clone(),
            self.wake.clone(),
            self.app_loops.clone(),
        );
        let receiver = ReceiverWorker::new(
            self.ctx.clone(),
            self.transport.clone(),
            self.inbound.clone(),
            self.stop.clone(),
            self.receiver_loops.clone(),
        );
        let sender = SenderWorker::new(
            self.ctx.clone(),
            self.registry.clone(),
            self.transport.clone(),
            self.stop.clone(),
            self.wake.clone(),
            self.sender_loops.clone(),
        );

        let app_handle = std::thread::Builder::new()
            .name("p2p0mq-app".into())
            .spawn(move || app.run())
            .map_err(|e| NodeError::Startup(anyhow::anyhow!(e)))?;
        let receiver_handle = std::thread::Builder::new()
            .name("p2p0mq-receiver".into())
            .spawn(move || receiver.run())
            .map_err(|e| NodeError::Startup(anyhow::anyhow!(e)))?;
        let sender_handle = std::thread::Builder::new()
            .name("p2p0mq-sender".into())
            .spawn(move || sender.run())
            .map_err(|e| NodeError::Startup(anyhow::anyhow!(e)))?;

        *self.workers.lock() = Some(Workers {
            app: app_handle,
            receiver: receiver_handle,
            sender: sender_handle,
        });

        Ok(())
    }

    /// Sends a best-effort `bye` (§4.12) to every `CONNECTED`/`ROUTED`
    /// peer, then signals every worker to stop and joins all three
    /// threads. Idempotent: calling this with no workers running is a
    /// no-op beyond the (harmless) `bye` enqueue.
    pub fn stop(&self) {
        if self.workers.lock().is_some() {
            for (priority, message) in ByeHandler::compose_for_all_connected(&self.ctx) {
                self.ctx.enqueue(priority, message);
            }
            self.wake.notify();
            // Give the sender thread a brief window to flush the
            // `bye`s before the transport socket goes away; peers that
            // miss it simply time out as usual (§4.12).
            std::thread::sleep(std::time::Duration::from_millis(100));
        }

        self.stop.store(true, Ordering::Relaxed);
        self.wake.notify();
        if let Some(workers) = self.workers.lock().take() {
            let _ = workers.app.join();
            let _ = workers.receiver.join();
            let _ = workers.sender.join();
        }
    }

    /// `true` once every worker has completed more than
    /// [`STABLE_LOOP_THRESHOLD`] loop iterations — the Rust analog of
    /// the original `stable()` check (`run_loop_counter > 4` on each
    /// of app/receiver/sender).
    pub fn is_stable(&self) -> bool {
        self.workers.lock().is_some()
            && self.app_loops.load(Ordering::Relaxed) > STABLE_LOOP_THRESHOLD
            && self.receiver_loops.load(Ordering::Relaxed) > STABLE_LOOP_THRESHOLD
            && self.sender_loops.load(Ordering::Relaxed) > STABLE_LOOP_THRESHOLD
    }

    /// Blocks until [`Node::is_stable`] returns `true` or
    /// `STABILIZE_TIMEOUT` (doubled, polling every 500ms — matching the
    /// original's `wait_to_stabilize`) elapses.
    pub fn wait_to_stabilize(&self) -> bool {
        let attempts = self.ctx.config.stabilize_timeout.as_secs() * 2;
        for _ in 0..attempts {
            if self.is_stable() {
                return true;
            }
            std::thread::sleep(std::time::Duration::from_millis(500));
        }
        self.is_stable()
    }

    /// Adds (or replaces) a peer record. A bare peer (no host) can
    /// still be reached once ask-around discovers a route.
    pub fn add_peer(&self, peer: Peer) {
        self.ctx.peers.insert(peer);
    }

    /// Removes and returns a peer record, if present.
    pub fn take_peer(&self, id: &NodeId) -> Option<Peer> {
        self.ctx.peers.remove(id)
    }

    /// Records `other`'s CURVE public key and tells the transport to
    /// reload its trust store (§5) — the two sides of a certificate
    /// exchange.
    pub fn exchange_certificates(
        &self,
        peer: &NodeId,
        key: crate::certstore::PublicKey,
    ) -> Result<(), NodeError> {
        self.cert_store
            .set_public_key(peer, key)
            .map_err(|e| NodeError::Startup(anyhow::anyhow!(e)))?;
        self.transport.reload_trust_store()?;
        Ok(())
    }

    /// Enqueues `message` at `priority` on the outbound queue, as if a
    /// handler had produced it. The entry point tests and embedding
    /// applications use to inject traffic directly.
    pub fn enqueue(&self, message: Message, priority: Priority) {
        self.ctx.enqueue(priority, message);
    }

    pub fn local_id(&self) -> &NodeId {
        &self.ctx.local_id
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }
}
