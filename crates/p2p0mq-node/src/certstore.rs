use std::collections::HashMap;
use std::fmt;

use p2p0mq_proto::NodeId;
use parking_lot::Mutex;

use crate::error::CertStoreError;

/// CURVE public key, 32 raw bytes. Safe to log and to send in an
/// `exchange_certificates` call.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub Vec<u8>);

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

/// CURVE secret key. Deliberately opaque in `Debug` — this must never
/// end up in a log line.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretKey(pub Vec<u8>);

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: PublicKey,
    pub secret: SecretKey,
}

/// The certificate store (§6): owned by the transport, read at
/// start-up, written to only via explicit `exchange_certificates`
/// calls (§5). Delegates all cryptographic design to the transport —
/// this crate only holds and hands out key material.
pub trait CertStore: Send + Sync {
    /// Returns the local node's key pair, generating and persisting
    /// one on first call. A failure here is fatal at start-up (§7).
    fn ensure_local_identity(&self) -> Result<KeyPair, CertStoreError>;

    fn public_key_of(&self, peer: &NodeId) -> Result<Option<PublicKey>, CertStoreError>;

    /// Records (or replaces) the public key on file for `peer`. Used
    /// by `exchange_certificates`; after calling this the transport
    /// must reload its trust store (§5) before the new key takes
    /// effect on already-open sockets.
    fn set_public_key(&self, peer: &NodeId, key: PublicKey) -> Result<(), CertStoreError>;
}

/// A process-memory certificate store. Generates a fresh CURVE key
/// pair on first use via `zmq::CurveKeyPair` when the `zmq-transport`
/// feature is enabled (the normal case); otherwise falls back to a
/// non-cryptographic placeholder suitable only for `Transport`
/// implementations that do not speak CURVE.
pub struct InMemoryCertStore {
    local: Mutex<Option<KeyPair>>,
    trust_store: Mutex<HashMap<NodeId, PublicKey>>,
}

impl InMemoryCertStore {
    pub fn new() -> Self {
        Self {
            local: Mutex::new(None),
            trust_store: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryCertStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CertStore for InMemoryCertStore {
    fn ensure_local_identity(&self) -> Result<KeyPair, CertStoreError> {
        let mut local = self.local.lock();
        if local.is_none() {
            *local = Some(generate_key_pair());
        }
        Ok(local.as_ref().unwrap().clone())
    }

    fn public_key_of(&self, peer: &NodeId) -> Result<Option<PublicKey>, CertStoreError> {
        Ok(self.trust_store.lock().get(peer).cloned())
    }

    fn set_public_key(&self, peer: &NodeId, key: PublicKey) -> Result<(), CertStoreError> {
        self.trust_store.lock().insert(peer.clone(), key);
        Ok(())
    }
}

#[cfg(feature = "zmq-transport")]
fn generate_key_pair() -> KeyPair {
    let pair = zmq::CurveKeyPair::new().expect("libsodium curve key generation");
    KeyPair {
        public: PublicKey(pair.public_key.to_vec()),
        secret: SecretKey(pair.secret_key.to_vec()),
    }
}

#[cfg(not(feature = "zmq-transport"))]
fn generate_key_pair() -> KeyPair {
    let public: Vec<u8> = uuid::Uuid::new_v4().as_bytes().to_vec();
    let secret: Vec<u8> = uuid::Uuid::new_v4().as_bytes().to_vec();
    KeyPair {
        public: PublicKey(public),
        secret: SecretKey(secret),
    }
}
