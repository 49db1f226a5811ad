//! Typed event dispatch
//!
//! Handlers are registered per [`EventKind`] and receive the context they may
//! mutate as an argument at dispatch time; the dispatcher itself holds no
//! state besides the handler table.

use std::collections::HashMap;

use crate::error::Result;
use crate::protocol::{EventKind, InboundEvent};

/// Handle returned by [`EventDispatcher::on`], used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler<C> = Box<dyn FnMut(&mut C, &InboundEvent) -> Result<()> + Send>;

/// Routes inbound events to handlers in registration order
pub struct EventDispatcher<C> {
    handlers: HashMap<EventKind, Vec<(HandlerId, Handler<C>)>>,
    next_id: u64,
}

impl<C> Default for EventDispatcher<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> EventDispatcher<C> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 0,
        }
    }

    /// Register a handler for one event kind
    pub fn on<F>(&mut self, kind: EventKind, handler: F) -> HandlerId
    where
        F: FnMut(&mut C, &InboundEvent) -> Result<()> + Send + 'static,
    {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(kind)
            .or_default()
            .push((id, Box::new(handler)));
        id
    }

    /// Remove a previously registered handler; returns whether it existed
    pub fn off(&mut self, kind: EventKind, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(handler_id, _)| *handler_id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(&kind);
        }
        removed
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.handlers.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver one event to every handler registered for its kind.
    ///
    /// A failing handler is logged and the remaining handlers still run.
    /// Returns how many handlers were invoked.
    pub fn dispatch(&mut self, ctx: &mut C, event: &InboundEvent) -> usize {
        let kind = event.kind();
        let Some(list) = self.handlers.get_mut(&kind) else {
            tracing::trace!(?kind, "No handler registered, dropping event");
            return 0;
        };

        for (id, handler) in list.iter_mut() {
            if let Err(e) = handler(ctx, event) {
                tracing::warn!(?kind, handler = id.0, "Event handler failed: {}", e);
            }
        }
        list.len()
    }
}
