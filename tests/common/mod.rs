//! Shared fakes for session integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use clinic_sync::api::{QueueApi, SendReceipt};
use clinic_sync::models::{Message, MessageId, SenderRole, SnapshotRecord, Thread};
use clinic_sync::protocol::ClientMessage;
use clinic_sync::transport::Transport;
use clinic_sync::{Result, SyncConfig, SyncError, SyncSession};

/// How the fake server answers a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Respond with the stored message
    Echo,
    /// Respond with a bare acknowledgement
    Ack,
    /// Reject the request
    Fail,
}

/// In-memory [`QueueApi`] with scripted responses and a call log
pub struct ScriptedApi {
    pub snapshot: Mutex<Vec<SnapshotRecord>>,
    pub threads: Mutex<Vec<Thread>>,
    pub backlogs: Mutex<HashMap<String, Vec<Message>>>,
    pub send_outcome: Mutex<SendOutcome>,
    pub close_fails: AtomicBool,
    pub backlog_fails: AtomicBool,
    calls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self {
            snapshot: Mutex::new(Vec::new()),
            threads: Mutex::new(Vec::new()),
            backlogs: Mutex::new(HashMap::new()),
            send_outcome: Mutex::new(SendOutcome::Echo),
            close_fails: AtomicBool::new(false),
            backlog_fails: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Records served by every following snapshot fetch
    pub fn set_snapshot(&self, records: Vec<SnapshotRecord>) {
        *self.snapshot.lock().unwrap() = records;
    }

    pub fn set_threads(&self, threads: Vec<Thread>) {
        *self.threads.lock().unwrap() = threads;
    }

    pub fn set_backlog(&self, thread_id: &str, messages: Vec<Message>) {
        self.backlogs
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), messages);
    }

    pub fn set_send_outcome(&self, outcome: SendOutcome) {
        *self.send_outcome.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl QueueApi for ScriptedApi {
    async fn fetch_departments(&self) -> Result<Vec<SnapshotRecord>> {
        self.log("fetch_departments".into());
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn fetch_threads(&self) -> Result<Vec<Thread>> {
        self.log("fetch_threads".into());
        Ok(self.threads.lock().unwrap().clone())
    }

    async fn fetch_messages(&self, thread_id: &str) -> Result<Vec<Message>> {
        self.log(format!("fetch_messages {}", thread_id));
        if self.backlog_fails.load(Ordering::SeqCst) {
            return Err(SyncError::network("Failed to load messages: connection reset"));
        }
        Ok(self
            .backlogs
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_message(&self, thread_id: &str, content: &str) -> Result<SendReceipt> {
        self.log(format!("send_message {}", thread_id));
        let outcome = *self.send_outcome.lock().unwrap();
        match outcome {
            SendOutcome::Echo => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                Ok(SendReceipt {
                    message: Some(server_message(
                        &format!("srv-{}", id),
                        thread_id,
                        SenderRole::Staff,
                        content,
                    )),
                })
            }
            SendOutcome::Ack => Ok(SendReceipt::default()),
            SendOutcome::Fail => Err(SyncError::rejected(500, "Failed to send message: 500")),
        }
    }

    async fn close_thread(&self, thread_id: &str) -> Result<()> {
        self.log(format!("close_thread {}", thread_id));
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(SyncError::rejected(403, "Failed to close thread: 403"));
        }
        Ok(())
    }

    async fn mark_read(&self, thread_id: &str, _message_ids: &[MessageId]) -> Result<()> {
        self.log(format!("mark_read {}", thread_id));
        Ok(())
    }
}

/// Transport that records emitted signals
pub struct RecordingTransport {
    connected: AtomicBool,
    sent: Mutex<Vec<ClientMessage>>,
}

impl RecordingTransport {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Transport for RecordingTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn emit(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SyncError::TransportUnavailable("offline".into()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

pub struct Harness {
    pub session: SyncSession,
    pub api: Arc<ScriptedApi>,
    pub transport: Arc<RecordingTransport>,
}

pub fn harness() -> Harness {
    harness_with(&SyncConfig::default())
}

pub fn harness_with(config: &SyncConfig) -> Harness {
    let api = Arc::new(ScriptedApi::new());
    let transport = Arc::new(RecordingTransport::new(true));
    let session = SyncSession::new(
        config,
        api.clone(),
        transport.clone(),
        SyncSession::channel(),
    );
    Harness {
        session,
        api,
        transport,
    }
}

/// Apply inputs until nothing arrives for a short while
pub async fn settle(session: &mut SyncSession) {
    while let Ok(Some(input)) =
        tokio::time::timeout(Duration::from_millis(100), session.next_input()).await
    {
        session.apply(input);
    }
}

pub fn server_message(id: &str, thread_id: &str, role: SenderRole, content: &str) -> Message {
    Message {
        id: MessageId::new(id),
        thread_id: thread_id.to_string(),
        sender_role: role,
        content: content.to_string(),
        created_at: Utc::now(),
        optimistic: false,
    }
}

pub fn record(id: &str, is_open: bool, doctor: &str, patient: &str) -> SnapshotRecord {
    SnapshotRecord {
        id: Some(id.to_string()),
        name: format!("Department {}", id),
        is_open,
        waiting_count: 3,
        serving_token: None,
        doctor: Some(doctor.to_string()),
        current_patient: Some(patient.to_string()),
    }
}
