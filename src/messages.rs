//! Per-thread message logs with optimistic sends
//!
//! Every insertion path (optimistic apply, backlog fetch, stream push) goes
//! through [`OptimisticMessageManager::insert`], which ignores ids already
//! present in the thread. A server copy of a message this client sent
//! replaces the optimistic record as soon as it is seen, whichever path
//! delivers it first.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SyncError};
use crate::lifecycle::ThreadLifecycle;
use crate::models::{Message, MessageId, Preview, SenderRole};
use crate::protocol::ClientMessage;
use crate::transport::Transport;

/// Where an optimistic send stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendState {
    /// Request in flight
    Pending,
    /// Server accepted it; `server_id` is known once a confirmed copy was seen
    Confirmed { server_id: Option<MessageId> },
    /// Request failed; the optimistic record was removed and the draft restored
    RolledBack,
}

/// Everything needed to issue the network request for a send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendTicket {
    pub temp_id: MessageId,
    pub thread_id: String,
    pub content: String,
}

/// Outcome of a failed send after local rollback
#[derive(Debug)]
pub struct RolledBackSend {
    pub thread_id: String,
    /// The text to put back in front of the user
    pub draft: String,
    pub error: SyncError,
}

/// What a confirmation still needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Confirmed message merged; nothing left to do
    Resolved,
    /// Only an acknowledgement came back; fetch the backlog for this thread
    NeedsBacklog { thread_id: String },
}

/// Which path a read receipt took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPath {
    /// Acknowledged over the live connection
    Pushed,
    /// Connection unavailable; caller must issue the request/response call
    Fallback,
}

#[derive(Debug)]
struct PendingSend {
    thread_id: String,
    /// The optimistic record as first shown
    record: Message,
    prior_preview: Preview,
    optimistic_preview: Preview,
    state: SendState,
}

#[derive(Debug, Default)]
struct MessageLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl MessageLog {
    fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    /// Insert keeping `created_at` order; equal timestamps keep arrival order
    fn insert_ordered(&mut self, message: Message) {
        let position = self
            .messages
            .iter()
            .rposition(|m| m.created_at <= message.created_at)
            .map_or(0, |i| i + 1);
        self.ids.insert(message.id.clone());
        self.messages.insert(position, message);
    }

    fn push_tail(&mut self, message: Message) {
        self.ids.insert(message.id.clone());
        self.messages.push(message);
    }

    fn remove(&mut self, id: &MessageId) -> Option<Message> {
        if !self.ids.remove(id) {
            return None;
        }
        let index = self.messages.iter().position(|m| &m.id == id)?;
        Some(self.messages.remove(index))
    }
}

/// Owner of message lists, drafts, read state and in-flight sends
#[derive(Debug)]
pub struct OptimisticMessageManager {
    local_role: SenderRole,
    logs: HashMap<String, MessageLog>,
    drafts: HashMap<String, String>,
    sends: HashMap<MessageId, PendingSend>,
    read: HashSet<MessageId>,
}

impl OptimisticMessageManager {
    pub fn new(local_role: SenderRole) -> Self {
        Self {
            local_role,
            logs: HashMap::new(),
            drafts: HashMap::new(),
            sends: HashMap::new(),
            read: HashSet::new(),
        }
    }

    /// Ordered messages of a thread; optimistic ones carry `optimistic = true`
    pub fn messages(&self, thread_id: &str) -> &[Message] {
        self.logs
            .get(thread_id)
            .map(|log| log.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, thread_id: &str, id: &MessageId) -> bool {
        self.logs
            .get(thread_id)
            .is_some_and(|log| log.contains(id))
    }

    pub fn draft(&self, thread_id: &str) -> &str {
        self.drafts.get(thread_id).map(String::as_str).unwrap_or("")
    }

    pub fn set_draft(&mut self, thread_id: &str, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            self.drafts.remove(thread_id);
        } else {
            self.drafts.insert(thread_id.to_string(), text);
        }
    }

    pub fn send_state(&self, temp_id: &MessageId) -> Option<&SendState> {
        self.sends.get(temp_id).map(|send| &send.state)
    }

    /// Sends not yet rolled back whose outcome is still being tracked
    pub fn in_flight(&self) -> usize {
        self.sends
            .values()
            .filter(|send| send.state != SendState::RolledBack)
            .count()
    }

    /// Acknowledged sends of a thread still waiting for their server copy
    pub fn unresolved(&self, thread_id: &str) -> usize {
        self.sends
            .values()
            .filter(|send| {
                send.thread_id == thread_id
                    && send.state == SendState::Confirmed { server_id: None }
            })
            .count()
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.read.contains(id)
    }

    /// Insert a message from any path. Returns false if its id is already
    /// in the thread.
    pub fn insert(&mut self, message: Message) -> bool {
        if !message.optimistic
            && message.sender_role == self.local_role
            && !self.contains(&message.thread_id, &message.id)
        {
            self.absorb_optimistic(&message);
        }
        self.store(message)
    }

    /// Insert without matching the message to an optimistic send
    fn store(&mut self, message: Message) -> bool {
        let log = self.logs.entry(message.thread_id.clone()).or_default();
        if log.contains(&message.id) {
            tracing::trace!(id = %message.id, "Duplicate message ignored");
            return false;
        }
        log.insert_ordered(message);
        true
    }

    /// Drop the optimistic twin of a confirmed message this client sent.
    /// Sends already bound to a server id are never matched again.
    fn absorb_optimistic(&mut self, confirmed: &Message) {
        let twin = self
            .sends
            .iter()
            .filter(|(temp_id, send)| {
                matches!(
                    send.state,
                    SendState::Pending | SendState::Confirmed { server_id: None }
                ) && send.thread_id == confirmed.thread_id
                    && send.record.content == confirmed.content
                    && self.contains(&send.thread_id, temp_id)
            })
            .map(|(temp_id, _)| temp_id.clone())
            .min_by_key(|temp_id| {
                self.logs
                    .get(&confirmed.thread_id)
                    .and_then(|log| log.messages.iter().position(|m| &m.id == temp_id))
            });

        let Some(temp_id) = twin else {
            return;
        };
        if let Some(log) = self.logs.get_mut(&confirmed.thread_id) {
            log.remove(&temp_id);
        }
        let in_flight = self
            .sends
            .get(&temp_id)
            .is_some_and(|send| send.state == SendState::Pending);
        if in_flight {
            // The response is still coming; remember the server id until then
            if let Some(send) = self.sends.get_mut(&temp_id) {
                send.state = SendState::Confirmed {
                    server_id: Some(confirmed.id.clone()),
                };
            }
        } else {
            self.sends.remove(&temp_id);
        }
        tracing::debug!(temp_id = %temp_id, server_id = %confirmed.id, "Optimistic message replaced");
    }

    /// A send's own response names `server_id`, so any other send matched to
    /// that copy from the stream goes back to pending with its record shown.
    fn release_binding(&mut self, server_id: &MessageId) {
        let bound_to = SendState::Confirmed {
            server_id: Some(server_id.clone()),
        };
        let mut restored = Vec::new();
        for (temp_id, send) in self.sends.iter_mut() {
            if send.state == bound_to {
                send.state = SendState::Pending;
                restored.push((temp_id.clone(), send.record.clone()));
            }
        }
        for (temp_id, record) in restored {
            tracing::debug!(temp_id = %temp_id, server_id = %server_id, "Stream copy belonged to another send");
            self.store(record);
        }
    }

    /// Apply a send locally before the server sees it.
    ///
    /// Fails without touching any state if the content is blank or the
    /// thread is not open.
    pub fn begin_send(
        &mut self,
        threads: &mut ThreadLifecycle,
        thread_id: &str,
        content: &str,
    ) -> Result<SendTicket> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::InvalidSend("message is empty".into()));
        }
        match threads.get(thread_id) {
            None => {
                return Err(SyncError::InvalidSend(format!(
                    "unknown thread {}",
                    thread_id
                )))
            }
            Some(thread) if !thread.is_open() => {
                return Err(SyncError::InvalidSend(format!(
                    "thread {} is closed",
                    thread_id
                )))
            }
            Some(_) => {}
        }

        let message = Message::optimistic(thread_id, self.local_role, content);
        let optimistic_preview = Preview {
            last_message: Some(message.content.clone()),
            last_message_at: Some(message.created_at),
        };
        let prior_preview = threads
            .set_preview(thread_id, optimistic_preview.clone())
            .unwrap_or_default();

        let ticket = SendTicket {
            temp_id: message.id.clone(),
            thread_id: thread_id.to_string(),
            content: content.to_string(),
        };
        self.sends.insert(
            message.id.clone(),
            PendingSend {
                thread_id: thread_id.to_string(),
                record: message.clone(),
                prior_preview,
                optimistic_preview,
                state: SendState::Pending,
            },
        );
        self.logs
            .entry(thread_id.to_string())
            .or_default()
            .push_tail(message);
        self.drafts.remove(thread_id);

        tracing::debug!(thread_id, temp_id = %ticket.temp_id, "Optimistic message applied");
        Ok(ticket)
    }

    /// The server accepted a send. `confirmed` is the stored message when the
    /// response carries one.
    pub fn confirm_send(&mut self, temp_id: &MessageId, confirmed: Option<Message>) -> Confirmation {
        let Some(thread_id) = self.sends.get(temp_id).map(|send| send.thread_id.clone()) else {
            // Send already resolved through another path
            if let Some(message) = confirmed {
                self.store(message);
            }
            return Confirmation::Resolved;
        };

        match confirmed {
            Some(message) => {
                self.sends.remove(temp_id);
                if let Some(log) = self.logs.get_mut(&thread_id) {
                    log.remove(temp_id);
                }
                self.release_binding(&message.id);
                self.store(message);
                Confirmation::Resolved
            }
            None if self.contains(&thread_id, temp_id) => {
                if let Some(send) = self.sends.get_mut(temp_id) {
                    send.state = SendState::Confirmed { server_id: None };
                }
                Confirmation::NeedsBacklog { thread_id }
            }
            None => {
                self.sends.remove(temp_id);
                Confirmation::Resolved
            }
        }
    }

    /// The send request failed: remove the optimistic record, restore the
    /// draft and the thread preview. The send is kept as
    /// [`SendState::RolledBack`]. Returns `None` if the message had already
    /// been confirmed through the stream, or was rolled back before.
    pub fn rollback_send(
        &mut self,
        threads: &mut ThreadLifecycle,
        temp_id: &MessageId,
        error: SyncError,
    ) -> Option<RolledBackSend> {
        let send = self.sends.get_mut(temp_id)?;
        match send.state {
            SendState::Pending => {}
            SendState::Confirmed { .. } => {
                tracing::warn!(temp_id = %temp_id, "Send reported failure after server copy arrived: {}", error);
                self.sends.remove(temp_id);
                return None;
            }
            SendState::RolledBack => return None,
        }

        send.state = SendState::RolledBack;
        let thread_id = send.thread_id.clone();
        let draft = send.record.content.clone();
        threads.restore_preview(&thread_id, send.prior_preview.clone(), &send.optimistic_preview);

        if let Some(log) = self.logs.get_mut(&thread_id) {
            log.remove(temp_id);
        }
        if self.draft(&thread_id).is_empty() {
            self.drafts.insert(thread_id.clone(), draft.clone());
        }

        tracing::warn!(thread_id = %thread_id, temp_id = %temp_id, "Send rolled back: {}", error);
        Some(RolledBackSend {
            thread_id,
            draft,
            error,
        })
    }

    /// Give up waiting for server copies of acknowledged sends in a thread.
    /// Their records stay in the log as delivered messages. Returns how many
    /// were settled.
    pub fn settle_unresolved(&mut self, thread_id: &str) -> usize {
        let settled: Vec<MessageId> = self
            .sends
            .iter()
            .filter(|(_, send)| {
                send.thread_id == thread_id
                    && send.state == SendState::Confirmed { server_id: None }
            })
            .map(|(temp_id, _)| temp_id.clone())
            .collect();

        for temp_id in &settled {
            self.sends.remove(temp_id);
            let record = self
                .logs
                .get_mut(thread_id)
                .and_then(|log| log.messages.iter_mut().find(|m| &m.id == temp_id));
            if let Some(record) = record {
                record.optimistic = false;
            }
        }
        settled.len()
    }

    /// Merge a fetched backlog. Server copies of this client's sends replace
    /// their optimistic records; acknowledged sends whose copy is missing stay
    /// unresolved (see [`Self::unresolved`]).
    pub fn merge_backlog(&mut self, thread_id: &str, backlog: Vec<Message>) -> usize {
        let mut inserted = 0;
        for message in backlog {
            if message.thread_id != thread_id {
                tracing::warn!(id = %message.id, thread_id, "Backlog message for another thread skipped");
                continue;
            }
            if self.insert(message) {
                inserted += 1;
            }
        }
        inserted
    }

    /// Apply read state locally and pick the delivery path for the receipt
    pub fn mark_read(
        &mut self,
        threads: &mut ThreadLifecycle,
        transport: &dyn Transport,
        thread_id: &str,
        message_ids: &[MessageId],
    ) -> ReadPath {
        self.read.extend(message_ids.iter().cloned());
        threads.mark_read(thread_id);

        if !transport.is_connected() {
            return ReadPath::Fallback;
        }
        let receipt = ClientMessage::MarkRead {
            thread_id: thread_id.to_string(),
            message_ids: message_ids.to_vec(),
        };
        match transport.emit(receipt) {
            Ok(()) => ReadPath::Pushed,
            Err(e) => {
                tracing::debug!(thread_id, "Push receipt failed, falling back: {}", e);
                ReadPath::Fallback
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Thread;
    use crate::test_support::RecordingTransport;
    use chrono::{Duration, Utc};

    fn setup() -> (OptimisticMessageManager, ThreadLifecycle) {
        let mut threads = ThreadLifecycle::new(SenderRole::Staff);
        threads.merge_fetched(vec![Thread::new("t-1", "billing")]);
        (OptimisticMessageManager::new(SenderRole::Staff), threads)
    }

    fn server_message(id: &str, role: SenderRole, content: &str) -> Message {
        Message {
            id: MessageId::new(id),
            thread_id: "t-1".into(),
            sender_role: role,
            content: content.into(),
            created_at: Utc::now(),
            optimistic: false,
        }
    }

    #[test]
    fn test_send_applies_optimistic_message_and_clears_draft() {
        let (mut messages, mut threads) = setup();
        messages.set_draft("t-1", "hello");

        let ticket = messages.begin_send(&mut threads, "t-1", "  hello ").unwrap();

        assert_eq!(ticket.content, "hello");
        assert!(ticket.temp_id.is_temp());
        let list = messages.messages("t-1");
        assert_eq!(list.len(), 1);
        assert!(list[0].optimistic);
        assert_eq!(messages.draft("t-1"), "");
        assert_eq!(threads.get("t-1").unwrap().last_message.as_deref(), Some("hello"));
        assert_eq!(messages.send_state(&ticket.temp_id), Some(&SendState::Pending));
    }

    #[test]
    fn test_blank_send_is_rejected_without_state_change() {
        let (mut messages, mut threads) = setup();
        messages.set_draft("t-1", "   ");

        let err = messages.begin_send(&mut threads, "t-1", "   ").unwrap_err();

        assert!(matches!(err, SyncError::InvalidSend(_)));
        assert!(messages.messages("t-1").is_empty());
        assert_eq!(messages.draft("t-1"), "   ");
        assert_eq!(messages.in_flight(), 0);
    }

    #[test]
    fn test_send_on_closed_thread_is_rejected() {
        let (mut messages, mut threads) = setup();
        threads.apply_remote_close("t-1", None);

        let err = messages.begin_send(&mut threads, "t-1", "hello").unwrap_err();

        assert!(matches!(err, SyncError::InvalidSend(_)));
        assert!(messages.messages("t-1").is_empty());
    }

    #[test]
    fn test_confirm_with_message_replaces_optimistic() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        let outcome = messages.confirm_send(
            &ticket.temp_id,
            Some(server_message("m-1", SenderRole::Staff, "hello")),
        );

        assert_eq!(outcome, Confirmation::Resolved);
        let list = messages.messages("t-1");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MessageId::new("m-1"));
        assert!(!list[0].optimistic);
        assert_eq!(messages.in_flight(), 0);
    }

    #[test]
    fn test_ack_only_confirmation_waits_for_backlog() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        let outcome = messages.confirm_send(&ticket.temp_id, None);
        assert_eq!(
            outcome,
            Confirmation::NeedsBacklog {
                thread_id: "t-1".into()
            }
        );
        assert!(messages.contains("t-1", &ticket.temp_id));

        messages.merge_backlog("t-1", vec![server_message("m-1", SenderRole::Staff, "hello")]);

        let list = messages.messages("t-1");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, MessageId::new("m-1"));
        assert_eq!(messages.in_flight(), 0);
    }

    #[test]
    fn test_dedup_across_optimistic_backlog_and_push() {
        let (mut messages, mut threads) = setup();
        messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        // Backlog arrives before the send response
        messages.merge_backlog("t-1", vec![server_message("m-1", SenderRole::Staff, "hello")]);
        // Then the stream pushes the same message
        assert!(!messages.insert(server_message("m-1", SenderRole::Staff, "hello")));

        let list = messages.messages("t-1");
        assert_eq!(list.iter().filter(|m| m.id.as_str() == "m-1").count(), 1);
        assert!(list.iter().all(|m| !m.id.is_temp()));
    }

    #[test]
    fn test_push_before_response_then_late_confirmation() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        messages.insert(server_message("m-1", SenderRole::Staff, "hello"));
        assert_eq!(
            messages.send_state(&ticket.temp_id),
            Some(&SendState::Confirmed {
                server_id: Some(MessageId::new("m-1"))
            })
        );

        messages.confirm_send(
            &ticket.temp_id,
            Some(server_message("m-1", SenderRole::Staff, "hello")),
        );

        assert_eq!(messages.messages("t-1").len(), 1);
        assert_eq!(messages.in_flight(), 0);
    }

    #[test]
    fn test_failed_send_rolls_back_and_restores_draft() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        let rolled_back = messages
            .rollback_send(&mut threads, &ticket.temp_id, SyncError::network("offline"))
            .unwrap();

        assert_eq!(rolled_back.draft, "hello");
        assert_eq!(messages.draft("t-1"), "hello");
        assert!(messages.messages("t-1").iter().all(|m| m.content != "hello"));
        assert_eq!(threads.get("t-1").unwrap().last_message, None);
        assert_eq!(messages.in_flight(), 0);
    }

    #[test]
    fn test_rollback_keeps_newer_draft() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();
        messages.set_draft("t-1", "second thought");

        let rolled_back = messages
            .rollback_send(&mut threads, &ticket.temp_id, SyncError::rejected(500, "boom"))
            .unwrap();

        assert_eq!(rolled_back.draft, "hello");
        assert_eq!(messages.draft("t-1"), "second thought");
    }

    #[test]
    fn test_rollback_after_stream_confirmation_is_ignored() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();
        messages.insert(server_message("m-1", SenderRole::Staff, "hello"));

        let rolled_back =
            messages.rollback_send(&mut threads, &ticket.temp_id, SyncError::network("timeout"));

        assert!(rolled_back.is_none());
        assert_eq!(messages.messages("t-1")[0].id, MessageId::new("m-1"));
    }

    #[test]
    fn test_confirmation_does_not_claim_identical_send() {
        let (mut messages, mut threads) = setup();
        let first = messages.begin_send(&mut threads, "t-1", "ok").unwrap();
        let second = messages.begin_send(&mut threads, "t-1", "ok").unwrap();

        messages.confirm_send(
            &second.temp_id,
            Some(server_message("m-b", SenderRole::Staff, "ok")),
        );

        assert!(messages.contains("t-1", &first.temp_id));
        assert_eq!(messages.send_state(&first.temp_id), Some(&SendState::Pending));

        let rolled_back = messages
            .rollback_send(&mut threads, &first.temp_id, SyncError::network("offline"))
            .unwrap();

        assert_eq!(rolled_back.draft, "ok");
        assert_eq!(messages.draft("t-1"), "ok");
        let ids: Vec<&str> = messages.messages("t-1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-b"]);
    }

    #[test]
    fn test_stream_copy_claimed_by_wrong_send_is_released() {
        let (mut messages, mut threads) = setup();
        let first = messages.begin_send(&mut threads, "t-1", "ok").unwrap();
        let second = messages.begin_send(&mut threads, "t-1", "ok").unwrap();

        // Stream copy of the second send matches the oldest send first
        messages.insert(server_message("m-b", SenderRole::Staff, "ok"));
        assert!(!messages.contains("t-1", &first.temp_id));

        messages.confirm_send(
            &second.temp_id,
            Some(server_message("m-b", SenderRole::Staff, "ok")),
        );

        assert!(messages.contains("t-1", &first.temp_id));
        assert_eq!(messages.send_state(&first.temp_id), Some(&SendState::Pending));

        let rolled_back =
            messages.rollback_send(&mut threads, &first.temp_id, SyncError::network("offline"));

        assert!(rolled_back.is_some());
        assert_eq!(messages.draft("t-1"), "ok");
        let ids: Vec<&str> = messages.messages("t-1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-b"]);
    }

    #[test]
    fn test_rolled_back_send_is_recorded() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();

        messages.rollback_send(&mut threads, &ticket.temp_id, SyncError::network("offline"));

        assert_eq!(messages.send_state(&ticket.temp_id), Some(&SendState::RolledBack));
        assert_eq!(messages.in_flight(), 0);
        assert!(messages
            .rollback_send(&mut threads, &ticket.temp_id, SyncError::network("again"))
            .is_none());
    }

    #[test]
    fn test_backlog_without_copy_leaves_send_unresolved() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "hello").unwrap();
        messages.confirm_send(&ticket.temp_id, None);

        messages.merge_backlog("t-1", vec![server_message("m-1", SenderRole::Patient, "hi")]);

        assert_eq!(messages.unresolved("t-1"), 1);
        assert!(messages.contains("t-1", &ticket.temp_id));

        assert_eq!(messages.settle_unresolved("t-1"), 1);
        assert_eq!(messages.unresolved("t-1"), 0);
        assert_eq!(messages.in_flight(), 0);
        let kept = messages
            .messages("t-1")
            .iter()
            .find(|m| m.id == ticket.temp_id)
            .unwrap();
        assert!(!kept.optimistic);
        assert_eq!(kept.content, "hello");
    }

    #[test]
    fn test_other_senders_do_not_absorb_optimistic() {
        let (mut messages, mut threads) = setup();
        let ticket = messages.begin_send(&mut threads, "t-1", "ok").unwrap();

        messages.insert(server_message("m-9", SenderRole::Patient, "ok"));

        assert!(messages.contains("t-1", &ticket.temp_id));
        assert_eq!(messages.messages("t-1").len(), 2);
    }

    #[test]
    fn test_messages_ordered_by_created_at_ties_by_arrival() {
        let mut messages = OptimisticMessageManager::new(SenderRole::Staff);
        let now = Utc::now();
        let mut late = server_message("m-3", SenderRole::Patient, "late");
        late.created_at = now + Duration::seconds(10);
        let mut first = server_message("m-1", SenderRole::Patient, "first");
        first.created_at = now;
        let mut tie = server_message("m-2", SenderRole::Patient, "tie");
        tie.created_at = now;

        messages.insert(late);
        messages.insert(first);
        messages.insert(tie);

        let ids: Vec<&str> = messages.messages("t-1").iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m-1", "m-2", "m-3"]);
    }

    #[test]
    fn test_mark_read_prefers_push() {
        let (mut messages, mut threads) = setup();
        let transport = RecordingTransport::new(true);

        let path = messages.mark_read(&mut threads, &transport, "t-1", &[MessageId::new("m-1")]);

        assert_eq!(path, ReadPath::Pushed);
        assert!(messages.is_read(&MessageId::new("m-1")));
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_mark_read_falls_back_when_offline() {
        let (mut messages, mut threads) = setup();
        let transport = RecordingTransport::new(false);

        let path = messages.mark_read(&mut threads, &transport, "t-1", &[MessageId::new("m-1")]);

        assert_eq!(path, ReadPath::Fallback);
        assert!(messages.is_read(&MessageId::new("m-1")));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_mark_read_falls_back_when_emit_fails() {
        let (mut messages, mut threads) = setup();
        let transport = RecordingTransport::new(true);
        transport.fail_emits(true);

        let path = messages.mark_read(&mut threads, &transport, "t-1", &[]);

        assert_eq!(path, ReadPath::Fallback);
    }
}
