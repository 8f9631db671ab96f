//! Peer table / repository reconciliation (§6, §4.8 step 1), grounded
//! on `PeerStore.sync_database` in the original source: peers present
//! in storage and absent in memory are added; peers present in memory
//! and absent in storage are inserted and receive a `db_id`; peers
//! present in both are left untouched.

use crate::error::RepositoryError;
use crate::peer::Peer;
use crate::peer_table::PeerTable;
use crate::repository::{PeerRecord, PeerRepository};

pub fn sync_database(
    table: &PeerTable,
    repository: &dyn PeerRepository,
) -> Result<(usize, usize), RepositoryError> {
    let stored = repository.load_all()?;
    let mut loaded = 0usize;
    let mut saved = 0usize;

    for record in &stored {
        if !table.contains(&record.id) {
            table.insert(Peer::new(
                record.id.clone(),
                record.host.clone(),
                record.port,
                record.db_id,
            ));
            loaded += 1;
        }
    }

    for peer in table.snapshot() {
        if peer.db_id.is_none() && !stored.iter().any(|r| r.id == peer.id) {
            let record = PeerRecord {
                id: peer.id.clone(),
                host: peer.host.clone(),
                port: peer.port,
                db_id: None,
            };
            let db_id = repository.upsert(&record)?;
            table.with_peer_mut(&peer.id, |p| p.db_id = Some(db_id));
            saved += 1;
        }
    }

    Ok((loaded, saved))
}
