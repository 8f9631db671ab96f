use thiserror::Error;

use p2p0mq_proto::CodecError;

/// Transport-level failures. The concrete `ZmqTransport` maps
/// `zmq::Error` into this; any other `Transport` impl maps its own
/// failures here too, so the rest of the node never depends on `zmq`
/// directly.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind receiver socket at {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to connect to peer at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("send failed: {0}")]
    Send(#[source] anyhow::Error),
    #[error("receive failed: {0}")]
    Receive(#[source] anyhow::Error),
    #[error("no known route to peer")]
    NoRoute,
}

/// Failures from the persistent peer store.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("repository backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Failures from the certificate store, fatal only at start-up per the
/// error handling design (§7): a bad certificate layout or unreadable
/// identity prevents the node from starting at all.
#[derive(Debug, Error)]
pub enum CertStoreError {
    #[error("failed to load or create local identity: {0}")]
    Identity(#[source] anyhow::Error),
    #[error("no public key on file for peer")]
    UnknownPeer,
}

/// Top-level node error. Only the startup-time variants here are
/// fatal; everything else is logged and handled by the peer state
/// machine (§7).
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration or identity error at startup: {0}")]
    Startup(#[source] anyhow::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    CertStore(#[from] CertStoreError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}
