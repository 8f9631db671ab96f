use std::collections::HashMap;

use p2p0mq_proto::{Message, Priority};

use crate::context::NodeContext;

/// A handler's verdict on an inbound request or reply: a message to
/// send back, at the given priority, or nothing.
pub type HandlerReply = Option<(Priority, Message)>;

/// §4.3 handler contract. Registered under a unique command id; every
/// hook receives the `NodeContext` explicitly (never a process-wide
/// global — see the composition notes in `node.rs`) so it can read
/// the clock, the peer table, and enqueue outgoing messages.
///
/// `tick`, `on_request` and `on_reply` always run on the app thread;
/// `on_sent`, `on_send_failed` and `on_dropped` always run on the
/// sender thread (§5) — implementations must not assume otherwise.
pub trait Handler: Send {
    /// The command id this handler owns. Unique across a registry.
    fn command_id(&self) -> &'static [u8];

    /// Called by the manager when it is installed, before the
    /// receiver/sender workers are started.
    fn start(&mut self, _ctx: &NodeContext) {}

    /// Called by the manager when it is uninstalled, after the
    /// receiver/sender workers have been stopped.
    fn stop(&mut self, _ctx: &NodeContext) {}

    /// Called once per app loop.
    fn tick(&mut self, _ctx: &NodeContext) {}

    /// Dispatch hook for an inbound `REQUEST`-kind message addressed
    /// to this handler's command.
    fn on_request(&mut self, _ctx: &NodeContext, _message: &Message) -> HandlerReply {
        None
    }

    /// Dispatch hook for an inbound `REPLY`-kind message. Usually
    /// produces no further reply.
    fn on_reply(&mut self, _ctx: &NodeContext, _message: &Message) -> HandlerReply {
        None
    }

    /// The message was handed to the transport successfully.
    fn on_sent(&mut self, _ctx: &NodeContext, _message: &Message) {}

    /// The transport failed to send the message and its
    /// `time_to_live` has not expired. Returning `Some(message)`
    /// re-queues it at the same priority; `None` drops it.
    fn on_send_failed(
        &mut self,
        _ctx: &NodeContext,
        message: Message,
        _error: &crate::error::TransportError,
    ) -> Option<Message> {
        let _ = message;
        None
    }

    /// The message's `time_to_live` expired before it could be sent.
    fn on_dropped(&mut self, _ctx: &NodeContext, _message: &Message) {}
}

/// Holds handlers keyed by command id. `add` asserts uniqueness;
/// `start_all`/`stop_all` are idempotent (calling either twice in a
/// row is a no-op on the second call).
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Vec<u8>, Box<dyn Handler>>,
    started: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, handler: Box<dyn Handler>) {
        let id = handler.command_id().to_vec();
        assert!(
            !self.handlers.contains_key(&id),
            "duplicate handler registered for command {:?}",
            id
        );
        self.handlers.insert(id, handler);
    }

    pub fn get_mut(&mut self, command: &[u8]) -> Option<&mut Box<dyn Handler>> {
        self.handlers.get_mut(command)
    }

    pub fn start_all(&mut self, ctx: &NodeContext) {
        if self.started {
            return;
        }
        for handler in self.handlers.values_mut() {
            handler.start(ctx);
        }
        self.started = true;
    }

    pub fn stop_all(&mut self, ctx: &NodeContext) {
        if !self.started {
            return;
        }
        for handler in self.handlers.values_mut() {
            handler.stop(ctx);
        }
        self.started = false;
    }

    pub fn tick_all(&mut self, ctx: &NodeContext) {
        for handler in self.handlers.values_mut() {
            handler.tick(ctx);
        }
    }
}
