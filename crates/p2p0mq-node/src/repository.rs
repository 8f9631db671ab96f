use std::collections::HashMap;

use p2p0mq_proto::{NodeId, Timestamp};
use parking_lot::Mutex;

use crate::error::RepositoryError;

/// Only identity round-trips through storage (§6) — state, heart-beat
/// timers and `via` are ephemeral and live solely in the in-memory
/// `Peer`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    pub id: NodeId,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub db_id: Option<i64>,
}

/// `peers(id, uuid, host, port)` / `meta(id, key, value, description)`
/// (§6), specified only by the interface the core needs: load
/// everything, upsert one record, and the two meta values read once
/// at start-up.
pub trait PeerRepository: Send + Sync {
    fn load_all(&self) -> Result<Vec<PeerRecord>, RepositoryError>;

    /// Inserts or updates `record`. Returns the `db_id` assigned to a
    /// newly inserted record (existing records keep their `db_id`).
    fn upsert(&self, record: &PeerRecord) -> Result<i64, RepositoryError>;

    /// The local node's persisted uuid, generating and persisting a
    /// fresh 32-character hex value if the meta table has none yet.
    fn local_uuid(&self) -> Result<String, RepositoryError>;

    /// Wall-clock seconds when the meta table was first created.
    fn created_at(&self) -> Result<Timestamp, RepositoryError>;
}

struct MetaState {
    uuid: String,
    created_at: Timestamp,
}

/// A repository backed by nothing but memory — useful for tests and
/// for single-process demos; a caller wanting durability across
/// restarts implements [`PeerRepository`] against sqlite, postgres,
/// or anything else.
pub struct InMemoryPeerRepository {
    peers: Mutex<HashMap<NodeId, PeerRecord>>,
    meta: Mutex<Option<MetaState>>,
    next_db_id: Mutex<i64>,
    now: Box<dyn Fn() -> Timestamp + Send + Sync>,
}

impl InMemoryPeerRepository {
    pub fn new() -> Self {
        Self::with_clock(p2p0mq_proto::now)
    }

    pub fn with_clock(now: impl Fn() -> Timestamp + Send + Sync + 'static) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            meta: Mutex::new(None),
            next_db_id: Mutex::new(1),
            now: Box::new(now),
        }
    }
}

impl Default for InMemoryPeerRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRepository for InMemoryPeerRepository {
    fn load_all(&self) -> Result<Vec<PeerRecord>, RepositoryError> {
        Ok(self.peers.lock().values().cloned().collect())
    }

    fn upsert(&self, record: &PeerRecord) -> Result<i64, RepositoryError> {
        let mut peers = self.peers.lock();
        let db_id = if let Some(existing) = peers.get(&record.id) {
            existing.db_id.unwrap_or_else(|| {
                let mut next = self.next_db_id.lock();
                let id = *next;
                *next += 1;
                id
            })
        } else {
            let mut next = self.next_db_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let mut stored = record.clone();
        stored.db_id = Some(db_id);
        peers.insert(stored.id.clone(), stored);
        Ok(db_id)
    }

    fn local_uuid(&self) -> Result<String, RepositoryError> {
        let mut meta = self.meta.lock();
        if meta.is_none() {
            *meta = Some(MetaState {
                uuid: uuid::Uuid::new_v4().simple().to_string(),
                created_at: (self.now)(),
            });
        }
        Ok(meta.as_ref().unwrap().uuid.clone())
    }

    fn created_at(&self) -> Result<Timestamp, RepositoryError> {
        self.local_uuid()?;
        Ok(self.meta.lock().as_ref().unwrap().created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: &[u8]) -> NodeId {
        NodeId::new(b.to_vec()).unwrap()
    }

    #[test]
    fn local_uuid_is_generated_once_and_is_stable() {
        let repo = InMemoryPeerRepository::new();
        let first = repo.local_uuid().unwrap();
        let second = repo.local_uuid().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn upsert_then_load_round_trips() {
        let repo = InMemoryPeerRepository::new();
        let record = PeerRecord {
            id: id(b"peer"),
            host: Some("127.0.0.1".into()),
            port: Some(8401),
            db_id: None,
        };
        let db_id = repo.upsert(&record).unwrap();
        assert!(db_id >= 1);

        let all = repo.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id(b"peer"));
        assert_eq!(all[0].db_id, Some(db_id));
    }

    #[test]
    fn upsert_of_existing_peer_keeps_db_id() {
        let repo = InMemoryPeerRepository::new();
        let record = PeerRecord {
            id: id(b"peer"),
            host: None,
            port: None,
            db_id: None,
        };
        let first_id = repo.upsert(&record).unwrap();
        let updated = PeerRecord {
            host: Some("10.0.0.1".into()),
            ..record
        };
        let second_id = repo.upsert(&updated).unwrap();
        assert_eq!(first_id, second_id);
    }
}
