//! Sync session: the single event loop that owns all client state
//!
//! Every change enters through [`Input`]: streaming events from the
//! transport, commands from the UI, and completions of network requests the
//! session spawned. Inputs are applied one at a time, so managers never race
//! each other. Requests run on spawned tasks and report back as
//! [`Input::Completed`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{HttpQueueApi, QueueApi, SendReceipt};
use crate::channels::ChannelSubscriptionManager;
use crate::config::SyncConfig;
use crate::departments::DepartmentBoard;
use crate::dispatcher::EventDispatcher;
use crate::error::{Result, SyncError};
use crate::lifecycle::{CloseTicket, ThreadLifecycle};
use crate::messages::{Confirmation, OptimisticMessageManager, ReadPath, SendState};
use crate::models::{
    Channel, ChannelKind, DepartmentStatus, Message, MessageId, QueueAction, SnapshotRecord,
    Thread,
};
use crate::pending::PendingUpdateBuffer;
use crate::protocol::{EventKind, InboundEvent};
use crate::transport::{Transport, WsTransport};

const INPUT_CAPACITY: usize = 256;

/// Anything that can change session state
#[derive(Debug)]
pub enum Input {
    Event(InboundEvent),
    Command(Command),
    Completed(Completion),
}

/// UI intents that can be queued instead of called directly
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenDepartment(String),
    LeaveDepartment,
    OpenThread(String),
    LeaveThread,
    RefreshDepartments,
    RefreshThreads,
    SetDraft { thread_id: String, text: String },
    Send { thread_id: String, content: String },
    Close { thread_id: String },
    MarkRead { thread_id: String, message_ids: Vec<MessageId> },
    Shutdown,
}

/// Result of a request the session spawned
#[derive(Debug)]
pub enum Completion {
    Snapshot {
        seq: u64,
        result: Result<Vec<SnapshotRecord>>,
    },
    Threads(Result<Vec<Thread>>),
    Backlog {
        thread_id: String,
        result: Result<Vec<Message>>,
    },
    Send {
        temp_id: MessageId,
        result: Result<SendReceipt>,
    },
    Close {
        ticket: CloseTicket,
        result: Result<()>,
    },
    MarkRead {
        thread_id: String,
        result: Result<()>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// User-facing message raised by the session, drained by the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Thread the notice concerns, if any
    pub thread_id: Option<String>,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            thread_id: None,
        }
    }

    fn for_thread(mut self, thread_id: &str) -> Self {
        self.thread_id = Some(thread_id.to_string());
        self
    }
}

/// Follow-up requests queued by event handlers
#[derive(Debug, Clone, PartialEq, Eq)]
enum Effect {
    FetchSnapshot,
    FetchThreads,
    FetchBacklog(String),
    /// Backlog fetch after `backlog_retry_delay`
    RetryBacklog(String),
}

/// State the event handlers operate on
struct SyncState {
    channels: ChannelSubscriptionManager,
    board: DepartmentBoard,
    threads: ThreadLifecycle,
    messages: OptimisticMessageManager,
    resync_on_call: bool,
    backlog_retries: u32,
    backlog_retry_delay: Duration,
    /// Retries spent per thread on acknowledged sends without a server copy
    retries_used: HashMap<String, u32>,
    notices: Vec<Notice>,
    effects: Vec<Effect>,
}

impl SyncState {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    fn request(&mut self, effect: Effect) {
        if !self.effects.contains(&effect) {
            self.effects.push(effect);
        }
    }
}

/// Client-side sync core for one signed-in user
pub struct SyncSession {
    state: SyncState,
    dispatcher: EventDispatcher<SyncState>,
    api: Arc<dyn QueueApi>,
    transport: Arc<dyn Transport>,
    inputs_tx: mpsc::Sender<Input>,
    inputs_rx: mpsc::Receiver<Input>,
}

impl SyncSession {
    /// Input channel to hand to a transport before building the session
    pub fn channel() -> (mpsc::Sender<Input>, mpsc::Receiver<Input>) {
        mpsc::channel(INPUT_CAPACITY)
    }

    pub fn new(
        config: &SyncConfig,
        api: Arc<dyn QueueApi>,
        transport: Arc<dyn Transport>,
        inputs: (mpsc::Sender<Input>, mpsc::Receiver<Input>),
    ) -> Self {
        let (inputs_tx, inputs_rx) = inputs;

        let mut dispatcher = EventDispatcher::new();
        dispatcher.on(EventKind::Connected, on_connected);
        dispatcher.on(EventKind::Disconnected, on_disconnected);
        dispatcher.on(EventKind::DepartmentUpdated, on_department_updated);
        dispatcher.on(EventKind::MessageCreated, on_message_created);
        dispatcher.on(EventKind::ThreadClosed, on_thread_closed);
        dispatcher.on(EventKind::ServerError, on_server_error);

        let state = SyncState {
            channels: ChannelSubscriptionManager::new(transport.clone()),
            board: DepartmentBoard::new(),
            threads: ThreadLifecycle::new(config.local_role),
            messages: OptimisticMessageManager::new(config.local_role),
            resync_on_call: config.resync_on_call,
            backlog_retries: config.backlog_retries,
            backlog_retry_delay: config.backlog_retry_delay,
            retries_used: HashMap::new(),
            notices: Vec::new(),
            effects: Vec::new(),
        };

        Self {
            state,
            dispatcher,
            api,
            transport,
            inputs_tx,
            inputs_rx,
        }
    }

    /// Build a session backed by the HTTP API and a reconnecting websocket
    pub fn connect(config: &SyncConfig) -> Self {
        let inputs = Self::channel();
        let transport = WsTransport::spawn(config.ws_url.clone(), config.reconnect, inputs.0.clone());
        let api = HttpQueueApi::new(config.api_url.clone());
        tracing::info!(api = %config.api_url, ws = %config.ws_url, "Starting sync session");
        Self::new(config, Arc::new(api), Arc::new(transport), inputs)
    }

    /// Sender for queueing commands from another task
    pub fn input_sender(&self) -> mpsc::Sender<Input> {
        self.inputs_tx.clone()
    }

    /// Wait for the next input
    pub async fn next_input(&mut self) -> Option<Input> {
        self.inputs_rx.recv().await
    }

    /// Apply one input. Returns false once a shutdown was requested.
    pub fn apply(&mut self, input: Input) -> bool {
        match input {
            Input::Event(event) => self.handle_event(event),
            Input::Command(Command::Shutdown) => return false,
            Input::Command(command) => self.handle_command(command),
            Input::Completed(completion) => self.handle_completion(completion),
        }
        true
    }

    /// Route a streaming event through the registered handlers
    pub fn handle_event(&mut self, event: InboundEvent) {
        self.dispatcher.dispatch(&mut self.state, &event);
        self.run_effects();
    }

    fn handle_command(&mut self, command: Command) {
        let outcome = match command {
            Command::OpenDepartment(id) => {
                self.open_department(&id);
                Ok(())
            }
            Command::LeaveDepartment => {
                self.leave_department();
                Ok(())
            }
            Command::OpenThread(id) => {
                self.open_thread(&id);
                Ok(())
            }
            Command::LeaveThread => {
                self.leave_thread();
                Ok(())
            }
            Command::RefreshDepartments => {
                self.refresh_departments();
                Ok(())
            }
            Command::RefreshThreads => {
                self.refresh_threads();
                Ok(())
            }
            Command::SetDraft { thread_id, text } => {
                self.set_draft(&thread_id, text);
                Ok(())
            }
            Command::Send { thread_id, content } => self.send(&thread_id, &content).map(|_| ()),
            Command::Close { thread_id } => self.close(&thread_id),
            Command::MarkRead {
                thread_id,
                message_ids,
            } => {
                self.mark_read(&thread_id, &message_ids);
                Ok(())
            }
            Command::Shutdown => Ok(()),
        };

        if let Err(e) = outcome {
            self.state
                .notify(Notice::new(NoticeLevel::Error, e.to_string()));
        }
    }

    /// Watch one department. Switching leaves the previous department first.
    pub fn open_department(&mut self, department_id: &str) {
        if self.state.channels.switch_to(ChannelKind::Department, department_id) {
            self.state.request(Effect::FetchSnapshot);
            self.run_effects();
        }
    }

    pub fn leave_department(&mut self) {
        self.state.channels.clear_active(ChannelKind::Department);
    }

    /// View one thread: join its channel and load its backlog
    pub fn open_thread(&mut self, thread_id: &str) {
        if self.state.channels.switch_to(ChannelKind::Thread, thread_id) {
            self.state.threads.set_viewing(Some(thread_id));
            self.state.request(Effect::FetchBacklog(thread_id.to_string()));
            self.run_effects();
        }
    }

    pub fn leave_thread(&mut self) {
        self.state.channels.clear_active(ChannelKind::Thread);
        self.state.threads.set_viewing(None);
    }

    pub fn refresh_departments(&mut self) {
        self.state.request(Effect::FetchSnapshot);
        self.run_effects();
    }

    pub fn refresh_threads(&mut self) {
        self.state.request(Effect::FetchThreads);
        self.run_effects();
    }

    pub fn set_draft(&mut self, thread_id: &str, text: impl Into<String>) {
        self.state.messages.set_draft(thread_id, text);
    }

    /// Send a message optimistically. Returns the temporary id shown until
    /// the server copy replaces it.
    pub fn send(&mut self, thread_id: &str, content: &str) -> Result<MessageId> {
        let ticket = self
            .state
            .messages
            .begin_send(&mut self.state.threads, thread_id, content)?;

        let api = self.api.clone();
        let temp_id = ticket.temp_id.clone();
        self.spawn_request(async move {
            let result = api.send_message(&ticket.thread_id, &ticket.content).await;
            Completion::Send {
                temp_id: ticket.temp_id,
                result,
            }
        });
        Ok(temp_id)
    }

    /// Request closing a ticket. The thread flips to CLOSED once the server
    /// accepts; repeated calls while in flight are ignored.
    pub fn close(&mut self, thread_id: &str) -> Result<()> {
        let Some(ticket) = self.state.threads.begin_close(thread_id)? else {
            return Ok(());
        };

        let api = self.api.clone();
        self.spawn_request(async move {
            let result = api.close_thread(&ticket.thread_id).await;
            Completion::Close { ticket, result }
        });
        Ok(())
    }

    /// Mark messages read, over the live connection when possible
    pub fn mark_read(&mut self, thread_id: &str, message_ids: &[MessageId]) -> ReadPath {
        let path = self.state.messages.mark_read(
            &mut self.state.threads,
            self.transport.as_ref(),
            thread_id,
            message_ids,
        );

        if path == ReadPath::Fallback {
            let api = self.api.clone();
            let thread_id = thread_id.to_string();
            let message_ids = message_ids.to_vec();
            self.spawn_request(async move {
                let result = api.mark_read(&thread_id, &message_ids).await;
                Completion::MarkRead { thread_id, result }
            });
        }
        path
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot { seq, result } => match result {
                Ok(records) => {
                    self.state.board.apply_snapshot(seq, records);
                }
                Err(e) => {
                    tracing::warn!("Failed to refresh departments: {}", e);
                    self.state.notify(Notice::new(
                        NoticeLevel::Warning,
                        format!("Could not refresh departments: {}", e),
                    ));
                }
            },
            Completion::Threads(result) => match result {
                Ok(threads) => self.state.threads.merge_fetched(threads),
                Err(e) => {
                    tracing::warn!("Failed to refresh threads: {}", e);
                    self.state.notify(Notice::new(
                        NoticeLevel::Warning,
                        format!("Could not refresh threads: {}", e),
                    ));
                }
            },
            Completion::Backlog { thread_id, result } => {
                match result {
                    Ok(backlog) => {
                        let latest = backlog
                            .iter()
                            .filter(|m| m.thread_id == thread_id)
                            .max_by_key(|m| m.created_at)
                            .cloned();
                        let inserted = self.state.messages.merge_backlog(&thread_id, backlog);
                        if let Some(latest) = latest {
                            self.state.threads.bump_preview(&latest);
                        }
                        tracing::debug!(thread_id = %thread_id, inserted, "Backlog merged");
                    }
                    Err(e) => {
                        tracing::warn!(thread_id = %thread_id, "Failed to load messages: {}", e);
                        self.state.notify(
                            Notice::new(
                                NoticeLevel::Warning,
                                format!("Could not load messages: {}", e),
                            )
                            .for_thread(&thread_id),
                        );
                    }
                }
                self.follow_up_unresolved(&thread_id);
            }
            Completion::Send { temp_id, result } => self.finish_send(temp_id, result),
            Completion::Close { ticket, result } => {
                let thread_id = ticket.thread_id.clone();
                match self.state.threads.finish_close(ticket, result) {
                    Ok(Some(notice)) => {
                        self.state.threads.bump_preview(&notice);
                        self.state.messages.insert(notice);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::error!(thread_id = %thread_id, "Failed to close ticket: {}", e);
                        self.state.notify(
                            Notice::new(
                                NoticeLevel::Error,
                                format!("Could not close ticket: {}", e),
                            )
                            .for_thread(&thread_id),
                        );
                    }
                }
            }
            Completion::MarkRead { thread_id, result } => {
                if let Err(e) = result {
                    tracing::warn!(thread_id = %thread_id, "Failed to send read receipt: {}", e);
                    self.state.notify(
                        Notice::new(
                            NoticeLevel::Warning,
                            format!("Read receipt not delivered: {}", e),
                        )
                        .for_thread(&thread_id),
                    );
                }
            }
        }
        self.run_effects();
    }

    fn finish_send(&mut self, temp_id: MessageId, result: Result<SendReceipt>) {
        match result {
            Ok(receipt) => {
                if let Some(message) = &receipt.message {
                    self.state.threads.bump_preview(message);
                }
                if let Confirmation::NeedsBacklog { thread_id } =
                    self.state.messages.confirm_send(&temp_id, receipt.message)
                {
                    self.state.retries_used.remove(&thread_id);
                    self.state.request(Effect::FetchBacklog(thread_id));
                }
            }
            Err(e) => {
                if let Some(rolled_back) =
                    self.state
                        .messages
                        .rollback_send(&mut self.state.threads, &temp_id, e)
                {
                    self.state.notify(
                        Notice::new(
                            NoticeLevel::Error,
                            format!("Message not sent: {}", rolled_back.error),
                        )
                        .for_thread(&rolled_back.thread_id),
                    );
                }
            }
        }
    }

    /// After a backlog fetch, retry while acknowledged sends still lack a
    /// server copy. Once retries run out they are kept as delivered.
    fn follow_up_unresolved(&mut self, thread_id: &str) {
        if self.state.messages.unresolved(thread_id) == 0 {
            self.state.retries_used.remove(thread_id);
            return;
        }

        let used = self.state.retries_used.get(thread_id).copied().unwrap_or(0);
        if used < self.state.backlog_retries {
            tracing::debug!(thread_id, attempt = used + 1, "Sent message missing from backlog, retrying");
            self.state.retries_used.insert(thread_id.to_string(), used + 1);
            self.state.request(Effect::RetryBacklog(thread_id.to_string()));
            return;
        }

        self.state.retries_used.remove(thread_id);
        let settled = self.state.messages.settle_unresolved(thread_id);
        tracing::warn!(thread_id, settled, "No server copy for acknowledged messages, keeping local copies");
    }

    fn run_effects(&mut self) {
        for effect in std::mem::take(&mut self.state.effects) {
            let api = self.api.clone();
            match effect {
                Effect::FetchSnapshot => {
                    let seq = self.state.board.begin_fetch();
                    self.spawn_request(async move {
                        Completion::Snapshot {
                            seq,
                            result: api.fetch_departments().await,
                        }
                    });
                }
                Effect::FetchThreads => {
                    self.spawn_request(async move { Completion::Threads(api.fetch_threads().await) });
                }
                Effect::FetchBacklog(thread_id) => {
                    self.spawn_request(async move {
                        let result = api.fetch_messages(&thread_id).await;
                        Completion::Backlog { thread_id, result }
                    });
                }
                Effect::RetryBacklog(thread_id) => {
                    let delay = self.state.backlog_retry_delay;
                    self.spawn_request(async move {
                        tokio::time::sleep(delay).await;
                        let result = api.fetch_messages(&thread_id).await;
                        Completion::Backlog { thread_id, result }
                    });
                }
            }
        }
    }

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = Completion> + Send + 'static,
    {
        let inputs = self.inputs_tx.clone();
        tokio::spawn(async move {
            let completion = request.await;
            if inputs.send(Input::Completed(completion)).await.is_err() {
                tracing::debug!("Session gone, dropping completion");
            }
        });
    }

    pub fn departments(&self) -> &[DepartmentStatus] {
        self.state.board.departments()
    }

    pub fn department(&self, id: &str) -> Option<&DepartmentStatus> {
        self.state.board.get(id)
    }

    pub fn pending_updates(&self) -> &PendingUpdateBuffer {
        self.state.board.pending()
    }

    /// Threads, most recent activity first
    pub fn threads(&self) -> &[Thread] {
        self.state.threads.threads()
    }

    pub fn thread(&self, id: &str) -> Option<&Thread> {
        self.state.threads.get(id)
    }

    pub fn is_closing(&self, thread_id: &str) -> bool {
        self.state.threads.is_closing(thread_id)
    }

    pub fn messages(&self, thread_id: &str) -> &[Message] {
        self.state.messages.messages(thread_id)
    }

    pub fn draft(&self, thread_id: &str) -> &str {
        self.state.messages.draft(thread_id)
    }

    pub fn send_state(&self, temp_id: &MessageId) -> Option<&SendState> {
        self.state.messages.send_state(temp_id)
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.state.messages.is_read(id)
    }

    pub fn channels(&self) -> &[Channel] {
        self.state.channels.channels()
    }

    pub fn active_department(&self) -> Option<&str> {
        self.state.channels.active(ChannelKind::Department)
    }

    pub fn active_thread(&self) -> Option<&str> {
        self.state.channels.active(ChannelKind::Thread)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Drain notices raised since the last call
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.state.notices)
    }
}

fn on_connected(state: &mut SyncState, _event: &InboundEvent) -> Result<()> {
    let rejoined = state.channels.on_connected();
    tracing::info!(rejoined, "Live connection established");

    // Anything may have changed while we were away
    if state.channels.active(ChannelKind::Department).is_some() {
        state.request(Effect::FetchSnapshot);
    }
    state.request(Effect::FetchThreads);
    if let Some(thread_id) = state.channels.active(ChannelKind::Thread) {
        let thread_id = thread_id.to_string();
        state.request(Effect::FetchBacklog(thread_id));
    }
    Ok(())
}

fn on_disconnected(state: &mut SyncState, _event: &InboundEvent) -> Result<()> {
    state.channels.on_disconnected();
    state.notify(Notice::new(
        NoticeLevel::Warning,
        "Connection lost, reconnecting",
    ));
    Ok(())
}

fn on_department_updated(state: &mut SyncState, event: &InboundEvent) -> Result<()> {
    let InboundEvent::DepartmentUpdated(update) = event else {
        return Err(SyncError::MalformedRecord(format!("unexpected {:?}", event.kind())));
    };
    state.board.apply_update(update);
    if state.resync_on_call && update.action == Some(QueueAction::Called) {
        state.request(Effect::FetchSnapshot);
    }
    Ok(())
}

fn on_message_created(state: &mut SyncState, event: &InboundEvent) -> Result<()> {
    let InboundEvent::MessageCreated(message) = event else {
        return Err(SyncError::MalformedRecord(format!("unexpected {:?}", event.kind())));
    };
    if !state.messages.insert(message.clone()) {
        return Ok(());
    }
    if !state.threads.record_message(message) {
        tracing::debug!(thread_id = %message.thread_id, "Message for unknown thread, refreshing list");
        state.request(Effect::FetchThreads);
    }
    Ok(())
}

fn on_thread_closed(state: &mut SyncState, event: &InboundEvent) -> Result<()> {
    let InboundEvent::ThreadClosed {
        thread_id,
        closed_by,
    } = event
    else {
        return Err(SyncError::MalformedRecord(format!("unexpected {:?}", event.kind())));
    };
    if let Some(notice) = state
        .threads
        .apply_remote_close(thread_id, closed_by.as_deref())
    {
        state.threads.bump_preview(&notice);
        state.notify(Notice::new(NoticeLevel::Info, notice.content.clone()).for_thread(thread_id));
        state.messages.insert(notice);
    }
    Ok(())
}

fn on_server_error(state: &mut SyncState, event: &InboundEvent) -> Result<()> {
    if let InboundEvent::ServerError { message } = event {
        tracing::warn!("Server reported error: {}", message);
        state.notify(Notice::new(NoticeLevel::Error, message.clone()));
    }
    Ok(())
}
