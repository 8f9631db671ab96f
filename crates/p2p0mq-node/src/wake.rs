use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

/// A "something happened, wake up" signal. Carries no payload — the
/// woken worker always re-checks its own queues rather than trusting
/// the signal's content, so multiple sends before a wake-up coalesce
/// for free (the channel has capacity 1 and a full channel is not an
/// error, just a no-op).
#[derive(Clone)]
pub struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    pub fn notify(&self) {
        match self.tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {}
        }
    }

    /// Blocks until notified or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) {
        let _ = self.rx.recv_timeout(timeout);
    }
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}
