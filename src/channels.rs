//! Channel subscriptions on top of the streaming connection
//!
//! The manager remembers which channels are wanted, independent of whether
//! the connection is currently up. Joins are emitted once per connection;
//! a reconnect re-emits a join for every wanted channel.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Channel, ChannelKind};
use crate::protocol::ClientMessage;
use crate::transport::Transport;

/// Tracks desired channels and their subscription state
pub struct ChannelSubscriptionManager {
    transport: Arc<dyn Transport>,
    /// Desired channels in the order they were requested
    desired: Vec<Channel>,
    /// The channel each consumer kind currently looks at
    active: HashMap<ChannelKind, String>,
}

impl ChannelSubscriptionManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            desired: Vec::new(),
            active: HashMap::new(),
        }
    }

    /// Current channels, with their subscribed flag
    pub fn channels(&self) -> &[Channel] {
        &self.desired
    }

    pub fn is_desired(&self, kind: ChannelKind, id: &str) -> bool {
        self.position(kind, id).is_some()
    }

    pub fn is_subscribed(&self, kind: ChannelKind, id: &str) -> bool {
        self.position(kind, id)
            .map(|i| self.desired[i].subscribed)
            .unwrap_or(false)
    }

    /// The channel currently switched to for a kind
    pub fn active(&self, kind: ChannelKind) -> Option<&str> {
        self.active.get(&kind).map(String::as_str)
    }

    fn position(&self, kind: ChannelKind, id: &str) -> Option<usize> {
        self.desired
            .iter()
            .position(|c| c.kind == kind && c.id == id)
    }

    /// Record a channel as wanted and emit a join if connected.
    ///
    /// Returns whether a join signal was emitted. A channel that is already
    /// subscribed is left alone.
    pub fn join(&mut self, kind: ChannelKind, id: &str) -> bool {
        let index = match self.position(kind, id) {
            Some(i) if self.desired[i].subscribed => {
                tracing::debug!(kind = kind.as_str(), id, "Already subscribed, collapsing join");
                return false;
            }
            Some(i) => i,
            None => {
                self.desired.push(Channel {
                    id: id.to_string(),
                    kind,
                    subscribed: false,
                });
                self.desired.len() - 1
            }
        };

        self.emit_join(index)
    }

    fn emit_join(&mut self, index: usize) -> bool {
        let channel = &mut self.desired[index];
        if !self.transport.is_connected() {
            tracing::debug!(
                kind = channel.kind.as_str(),
                id = %channel.id,
                "Offline, join deferred until reconnect"
            );
            return false;
        }

        match self
            .transport
            .emit(ClientMessage::join(channel.kind, &channel.id))
        {
            Ok(()) => {
                channel.subscribed = true;
                true
            }
            Err(e) => {
                tracing::warn!(id = %channel.id, "Failed to emit join: {}", e);
                false
            }
        }
    }

    /// Forget a channel and emit a leave if it was subscribed.
    ///
    /// Returns whether a leave signal was emitted.
    pub fn leave(&mut self, kind: ChannelKind, id: &str) -> bool {
        let Some(index) = self.position(kind, id) else {
            tracing::debug!(kind = kind.as_str(), id, "Not joined, ignoring leave");
            return false;
        };
        let channel = self.desired.remove(index);
        if self.active.get(&kind).map(String::as_str) == Some(id) {
            self.active.remove(&kind);
        }

        if !channel.subscribed || !self.transport.is_connected() {
            return false;
        }
        match self.transport.emit(ClientMessage::leave(kind, id)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(id, "Failed to emit leave: {}", e);
                false
            }
        }
    }

    /// Point a consumer kind at a different channel.
    ///
    /// Leaves the previously active channel first, then joins the new one.
    /// Switching to the channel already active does nothing and returns false.
    pub fn switch_to(&mut self, kind: ChannelKind, id: &str) -> bool {
        if self.active(kind) == Some(id) {
            tracing::debug!(kind = kind.as_str(), id, "Channel already active");
            return false;
        }
        if let Some(previous) = self.active.remove(&kind) {
            self.leave(kind, &previous);
        }
        self.active.insert(kind, id.to_string());
        self.join(kind, id);
        true
    }

    /// Leave whatever channel is active for a kind
    pub fn clear_active(&mut self, kind: ChannelKind) -> bool {
        match self.active.remove(&kind) {
            Some(previous) => self.leave(kind, &previous),
            None => false,
        }
    }

    /// Connection came up: re-emit joins for every desired channel
    pub fn on_connected(&mut self) -> usize {
        for channel in &mut self.desired {
            channel.subscribed = false;
        }
        let mut rejoined = 0;
        for index in 0..self.desired.len() {
            if self.emit_join(index) {
                rejoined += 1;
            }
        }
        tracing::info!(rejoined, "Channels rejoined after connect");
        rejoined
    }

    /// Connection dropped: keep the desired set, mark everything unsubscribed
    pub fn on_disconnected(&mut self) {
        for channel in &mut self.desired {
            channel.subscribed = false;
        }
    }
}
