use std::collections::{HashMap, VecDeque};

use p2p0mq_proto::{Kind, Message, NodeId, Priority};
use parking_lot::Mutex;

use crate::peer::Peer;
use crate::wake::WakeSignal;

/// The three-lane FAST/MEDIUM/SLOW egress queue (§3, §5). Internally
/// synchronized; `enqueue` signals `wake` so a sleeping sender worker
/// notices new work without polling.
pub struct PriorityQueues {
    fast: Mutex<VecDeque<Message>>,
    medium: Mutex<VecDeque<Message>>,
    slow: Mutex<VecDeque<Message>>,
    wake: WakeSignal,
}

impl PriorityQueues {
    pub fn new(wake: WakeSignal) -> Self {
        Self {
            fast: Mutex::new(VecDeque::new()),
            medium: Mutex::new(VecDeque::new()),
            slow: Mutex::new(VecDeque::new()),
            wake,
        }
    }

    fn lane(&self, priority: Priority) -> &Mutex<VecDeque<Message>> {
        match priority {
            Priority::Fast => &self.fast,
            Priority::Medium => &self.medium,
            Priority::Slow => &self.slow,
        }
    }

    pub fn enqueue(&self, priority: Priority, message: Message) {
        self.lane(priority).lock().push_back(message);
        self.wake.notify();
    }

    pub fn is_empty(&self) -> bool {
        self.fast.lock().is_empty() && self.medium.lock().is_empty() && self.slow.lock().is_empty()
    }

    /// Drains up to `limit` messages in strict priority order: every
    /// FAST message ahead of any MEDIUM, every MEDIUM ahead of any
    /// SLOW, FIFO within a lane. Tags each message with the lane it
    /// came from so a caller that needs to re-enqueue it later (a
    /// failed send retry, say) can preserve its original priority
    /// instead of guessing one.
    pub fn dequeue(&self, limit: usize) -> Vec<(Priority, Message)> {
        let mut out = Vec::with_capacity(limit.min(16));
        for (priority, lane) in [
            (Priority::Fast, &self.fast),
            (Priority::Medium, &self.medium),
            (Priority::Slow, &self.slow),
        ] {
            if out.len() >= limit {
                break;
            }
            let mut guard = lane.lock();
            while out.len() < limit {
                match guard.pop_front() {
                    Some(m) => out.push((priority, m)),
                    None => break,
                }
            }
        }
        out
    }
}

/// One pending connect message per peer (§3), drained exclusively by
/// the sender worker's `connect_peers` step.
pub struct ConnectionQueue {
    pending: Mutex<HashMap<NodeId, (Peer, Message)>>,
    wake: WakeSignal,
}

impl ConnectionQueue {
    pub fn new(wake: WakeSignal) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            wake,
        }
    }

    pub fn enqueue(&self, peer: Peer, message: Message) {
        self.pending.lock().insert(peer.id.clone(), (peer, message));
        self.wake.notify();
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<(Peer, Message)> {
        self.pending.lock().drain().map(|(_, v)| v).collect()
    }
}

/// The REQUEST/REPLY/ROUTE inbound classification (§3), filled by the
/// receiver worker and drained by the app worker.
pub struct TypedInboundQueues {
    request: Mutex<VecDeque<Message>>,
    reply: Mutex<VecDeque<Message>>,
    route: Mutex<VecDeque<Message>>,
    wake: WakeSignal,
}

impl TypedInboundQueues {
    pub fn new(wake: WakeSignal) -> Self {
        Self {
            request: Mutex::new(VecDeque::new()),
            reply: Mutex::new(VecDeque::new()),
            route: Mutex::new(VecDeque::new()),
            wake,
        }
    }

    fn lane(&self, kind: Kind) -> &Mutex<VecDeque<Message>> {
        match kind {
            Kind::Request => &self.request,
            Kind::Reply => &self.reply,
            Kind::Route => &self.route,
        }
    }

    pub fn push(&self, message: Message) {
        let kind = message.kind;
        self.lane(kind).lock().push_back(message);
        self.wake.notify();
    }

    pub fn is_empty(&self) -> bool {
        self.request.lock().is_empty() && self.reply.lock().is_empty() && self.route.lock().is_empty()
    }

    pub fn drain(&self, kind: Kind, limit: usize) -> Vec<Message> {
        let mut guard = self.lane(kind).lock();
        let n = limit.min(guard.len());
        guard.drain(..n).collect()
    }
}
