use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use p2p0mq_proto::Timestamp;

/// Abstracts "now" so handler/state-machine tests can advance time
/// deterministically instead of sleeping. Every deadline in the node
/// is read from a single `Clock::now()` call per app loop (§5), never
/// re-read mid-sweep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall-clock time, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        p2p0mq_proto::now()
    }
}

/// A clock tests can advance by hand.
#[derive(Debug, Clone)]
pub struct TestClock(Arc<AtomicU64>);

impl TestClock {
    pub fn new(start: Timestamp) -> Self {
        Self(Arc::new(AtomicU64::new(start)))
    }

    pub fn advance(&self, secs: u64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, at: Timestamp) {
        self.0.store(at, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Timestamp {
        self.0.load(Ordering::SeqCst)
    }
}
