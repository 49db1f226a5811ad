//! Ticket thread list and the OPEN -> CLOSED lifecycle
//!
//! Threads are never removed during a session. Status only moves forward:
//! once a thread is CLOSED, nothing (a stale fetch included) reopens it.

use std::cmp::Reverse;
use std::collections::HashSet;

use crate::error::{Result, SyncError};
use crate::models::{Message, Preview, SenderRole, Thread, TicketStatus};

/// Proof that a close request may be issued for a thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseTicket {
    pub thread_id: String,
}

/// Thread list owner and lifecycle state machine
#[derive(Debug)]
pub struct ThreadLifecycle {
    local_role: SenderRole,
    threads: Vec<Thread>,
    closing: HashSet<String>,
    viewing: Option<String>,
}

impl ThreadLifecycle {
    pub fn new(local_role: SenderRole) -> Self {
        Self {
            local_role,
            threads: Vec::new(),
            closing: HashSet::new(),
            viewing: None,
        }
    }

    /// Threads, most recent activity first
    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn get(&self, thread_id: &str) -> Option<&Thread> {
        self.threads.iter().find(|t| t.id == thread_id)
    }

    fn get_mut(&mut self, thread_id: &str) -> Option<&mut Thread> {
        self.threads.iter_mut().find(|t| t.id == thread_id)
    }

    pub fn is_open(&self, thread_id: &str) -> bool {
        self.get(thread_id).is_some_and(Thread::is_open)
    }

    pub fn is_closing(&self, thread_id: &str) -> bool {
        self.closing.contains(thread_id)
    }

    pub fn viewing(&self) -> Option<&str> {
        self.viewing.as_deref()
    }

    /// Mark which thread the user has open; it is read while viewed
    pub fn set_viewing(&mut self, thread_id: Option<&str>) {
        self.viewing = thread_id.map(str::to_string);
        if let Some(id) = thread_id {
            if let Some(thread) = self.get_mut(id) {
                thread.unread = false;
            }
        }
    }

    fn sort(&mut self) {
        // Stable: threads without activity keep their relative order at the end
        self.threads
            .sort_by_key(|t| Reverse(t.last_message_at));
    }

    /// Merge a fetched thread list into the local one
    pub fn merge_fetched(&mut self, fetched: Vec<Thread>) {
        for incoming in fetched {
            let viewing = self.viewing.as_deref() == Some(incoming.id.as_str());
            match self.get_mut(&incoming.id) {
                Some(local) => {
                    if incoming.status == TicketStatus::Closed {
                        local.status = TicketStatus::Closed;
                    }
                    if !incoming.category.is_empty() {
                        local.category = incoming.category;
                    }
                    if incoming.last_message_at > local.last_message_at {
                        local.last_message = incoming.last_message;
                        local.last_message_at = incoming.last_message_at;
                        local.unread = incoming.unread && !viewing;
                    }
                }
                None => {
                    let mut thread = incoming;
                    if viewing {
                        thread.unread = false;
                    }
                    self.threads.push(thread);
                }
            }
        }
        self.sort();
    }

    /// Bump the preview for a newly arrived message and flag the thread
    /// unread unless it is being viewed or the message is our own. Returns
    /// false if the thread is unknown.
    pub fn record_message(&mut self, message: &Message) -> bool {
        if !self.bump_preview(message) {
            return false;
        }
        let viewing = self.viewing.as_deref() == Some(message.thread_id.as_str());
        let local_role = self.local_role;
        if let Some(thread) = self.get_mut(&message.thread_id) {
            if !viewing && !message.optimistic && message.sender_role != local_role {
                thread.unread = true;
            }
        }
        true
    }

    /// Move the preview forward to `message` if it is not older than the
    /// current one. Leaves the unread flag alone.
    pub fn bump_preview(&mut self, message: &Message) -> bool {
        let Some(thread) = self.get_mut(&message.thread_id) else {
            return false;
        };
        if thread
            .last_message_at
            .map_or(true, |at| message.created_at >= at)
        {
            thread.last_message = Some(message.content.clone());
            thread.last_message_at = Some(message.created_at);
            self.sort();
        }
        true
    }

    /// Replace the preview, returning the previous one
    pub fn set_preview(&mut self, thread_id: &str, preview: Preview) -> Option<Preview> {
        let thread = self.get_mut(thread_id)?;
        let prior = thread.preview();
        thread.last_message = preview.last_message;
        thread.last_message_at = preview.last_message_at;
        self.sort();
        Some(prior)
    }

    /// Put back `prior` if the preview still shows `expected`
    pub fn restore_preview(&mut self, thread_id: &str, prior: Preview, expected: &Preview) -> bool {
        match self.get(thread_id) {
            Some(thread) if thread.preview() == *expected => {
                self.set_preview(thread_id, prior);
                true
            }
            _ => false,
        }
    }

    pub fn mark_read(&mut self, thread_id: &str) {
        if let Some(thread) = self.get_mut(thread_id) {
            thread.unread = false;
        }
    }

    /// Start closing a thread. `Ok(None)` means there is nothing to do: the
    /// thread is already closed or a close is in flight.
    pub fn begin_close(&mut self, thread_id: &str) -> Result<Option<CloseTicket>> {
        let thread = self
            .get(thread_id)
            .ok_or_else(|| SyncError::NotFound(format!("thread {}", thread_id)))?;
        if !thread.is_open() {
            tracing::debug!(thread_id, "Thread already closed");
            return Ok(None);
        }
        if !self.closing.insert(thread_id.to_string()) {
            tracing::debug!(thread_id, "Close already in flight");
            return Ok(None);
        }
        Ok(Some(CloseTicket {
            thread_id: thread_id.to_string(),
        }))
    }

    /// Finish a close request. On success the thread flips to CLOSED and the
    /// synthetic closure message is returned (unless a remote closure got
    /// there first). On failure the thread stays as it is and the error is
    /// handed back.
    pub fn finish_close(&mut self, ticket: CloseTicket, outcome: Result<()>) -> Result<Option<Message>> {
        self.closing.remove(&ticket.thread_id);
        match outcome {
            Ok(()) => Ok(self.flip_closed(&ticket.thread_id, None)),
            Err(e) if !self.is_open(&ticket.thread_id) => {
                tracing::debug!(thread_id = %ticket.thread_id, "Close failed but thread closed remotely: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// A closure event arrived over the stream
    pub fn apply_remote_close(&mut self, thread_id: &str, closed_by: Option<&str>) -> Option<Message> {
        if self.get(thread_id).is_none() {
            tracing::debug!(thread_id, "Closure for unknown thread ignored");
            return None;
        }
        self.flip_closed(thread_id, closed_by)
    }

    fn flip_closed(&mut self, thread_id: &str, closed_by: Option<&str>) -> Option<Message> {
        let thread = self.get_mut(thread_id)?;
        if !thread.is_open() {
            return None;
        }
        thread.status = TicketStatus::Closed;
        tracing::info!(thread_id, "Ticket closed");
        Some(Message::closure_notice(thread_id, closed_by))
    }
}
