//! Three-threaded peer mesh node: state machine, handlers, router and
//! transport, built on the wire format in `p2p0mq-proto`.

mod clock;
mod config;
mod context;
mod error;
mod handler;
mod handlers;
mod node;
mod peer;
mod peer_table;
mod queues;
mod repository;
mod router;
mod sync;
mod telemetry;
mod transport;
mod wake;
mod workers;

pub mod certstore;

pub use certstore::{CertStore, InMemoryCertStore, KeyPair, PublicKey};
pub use clock::{Clock, SystemClock, TestClock};
pub use config::NodeConfig;
pub use context::NodeContext;
pub use error::{CertStoreError, NodeError, RepositoryError, TransportError};
pub use handler::{Handler, HandlerReply, HandlerRegistry};
pub use handlers::{AskAroundHandler, ConnectorHandler, HeartBeatHandler};
pub use node::{Node, NodeBuilder};
pub use peer::{Peer, PeerState};
pub use repository::{InMemoryPeerRepository, PeerRecord, PeerRepository};
pub use telemetry::{NullTelemetry, TelemetryHook, TracingTelemetry};
pub use transport::Transport;
#[cfg(feature = "zmq-transport")]
pub use transport::ZmqTransport;

pub use p2p0mq_proto::{Kind, Message, NodeId, Payload, Priority, Timestamp};
