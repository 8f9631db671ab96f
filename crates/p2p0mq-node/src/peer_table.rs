use std::collections::HashMap;

use p2p0mq_proto::NodeId;
use parking_lot::Mutex;

use crate::peer::Peer;

/// The peer table (§5): a single mutex guarding every peer record.
/// Handlers acquire it for the duration of one sweep and never hold
/// it across I/O or a call into another component — enforced here by
/// only exposing closure-scoped access, never a guard the caller can
/// stash.
#[derive(Default)]
pub struct PeerTable {
    inner: Mutex<HashMap<NodeId, Peer>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, peer: Peer) {
        self.inner.lock().insert(peer.id.clone(), peer);
    }

    pub fn remove(&self, id: &NodeId) -> Option<Peer> {
        self.inner.lock().remove(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.inner.lock().contains_key(id)
    }

    pub fn clone_peer(&self, id: &NodeId) -> Option<Peer> {
        self.inner.lock().get(id).cloned()
    }

    pub fn with_peer_mut<R>(&self, id: &NodeId, f: impl FnOnce(&mut Peer) -> R) -> Option<R> {
        self.inner.lock().get_mut(id).map(f)
    }

    pub fn snapshot(&self) -> Vec<Peer> {
        self.inner.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    #[test]
    fn insert_remove_round_trip() {
        let table = PeerTable::new();
        table.insert(Peer::new(id(b"peer"), None, None, None));
        assert!(table.contains(&id(b"peer")));
        assert_eq!(table.len(), 1);
        assert!(table.remove(&id(b"peer")).is_some());
        assert!(table.is_empty());
    }

}
