//! Data models for department boards, ticket threads and messages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Prefix reserved for client-assigned message ids
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Prefix for synthetic system messages generated locally
pub const SYSTEM_ID_PREFIX: &str = "system-";

/// Value shown for a volatile field nobody has filled in
pub const PLACEHOLDER: &str = "-";

/// Kind of logical channel on top of the streaming connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Department,
    Thread,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Department => "department",
            ChannelKind::Thread => "thread",
        }
    }
}

/// A logical subscription scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Channel {
    pub id: String,
    pub kind: ChannelKind,
    pub subscribed: bool,
}

/// Queue status of one department as held by the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentStatus {
    pub id: String,
    pub name: String,
    pub is_open: bool,
    pub waiting_count: u32,
    pub serving_token: Option<String>,
    /// Volatile: assigned doctor
    pub doctor: String,
    /// Volatile: patient currently being seen
    pub current_patient: String,
}

/// One record of an authoritative department snapshot as received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_open: bool,
    #[serde(default)]
    pub waiting_count: u32,
    #[serde(default)]
    pub serving_token: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    #[serde(default)]
    pub current_patient: Option<String>,
}

/// Partial field set carried by a streaming department event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_open: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waiting_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_patient: Option<String>,
}

impl DepartmentPatch {
    /// Overlay `newer` on top of this patch, field by field
    pub fn merge(&mut self, newer: DepartmentPatch) {
        if newer.is_open.is_some() {
            self.is_open = newer.is_open;
        }
        if newer.waiting_count.is_some() {
            self.waiting_count = newer.waiting_count;
        }
        if newer.serving_token.is_some() {
            self.serving_token = newer.serving_token;
        }
        if newer.doctor.is_some() {
            self.doctor = newer.doctor;
        }
        if newer.current_patient.is_some() {
            self.current_patient = newer.current_patient;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == DepartmentPatch::default()
    }
}

/// What happened at the counter that produced a department event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueAction {
    Called,
    Completed,
    Skipped,
    NoShow,
    PositionUpdate,
}

/// Streaming update for one department
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepartmentUpdate {
    pub department_id: String,
    pub action: Option<QueueAction>,
    pub patch: DepartmentPatch,
}

/// Ticket status; moves OPEN -> CLOSED only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    Open,
    Closed,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "OPEN",
            TicketStatus::Closed => "CLOSED",
        }
    }
}

impl std::str::FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" | "open" => Ok(TicketStatus::Open),
            "CLOSED" | "closed" => Ok(TicketStatus::Closed),
            _ => Err(format!("Invalid ticket status: {}", s)),
        }
    }
}

/// A support ticket conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: String,
    #[serde(default)]
    pub category: String,
    pub status: TicketStatus,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub unread: bool,
}

impl Thread {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            status: TicketStatus::Open,
            last_message: None,
            last_message_at: None,
            unread: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TicketStatus::Open
    }

    pub fn preview(&self) -> Preview {
        Preview {
            last_message: self.last_message.clone(),
            last_message_at: self.last_message_at,
        }
    }
}

/// The list-row preview of a thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Preview {
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    Patient,
    Staff,
    System,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderRole::Patient => "patient",
            SenderRole::Staff => "staff",
            SenderRole::System => "system",
        }
    }
}

impl std::str::FromStr for SenderRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(SenderRole::Patient),
            "staff" => Ok(SenderRole::Staff),
            "system" => Ok(SenderRole::System),
            _ => Err(format!("Invalid sender role: {}", s)),
        }
    }
}

/// Message identifier, either server-assigned or a client temp id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh client-side id for an optimistic message
    pub fn temp() -> Self {
        Self(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4()))
    }

    /// Id of the synthetic message recording a thread's closure
    pub fn closure(thread_id: &str) -> Self {
        Self(format!("{}closed-{}", SYSTEM_ID_PREFIX, thread_id))
    }

    pub fn is_temp(&self) -> bool {
        self.0.starts_with(TEMP_ID_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A message within a ticket thread
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub thread_id: String,
    pub sender_role: SenderRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub optimistic: bool,
}

impl Message {
    /// Local, not yet confirmed message
    pub fn optimistic(
        thread_id: impl Into<String>,
        sender_role: SenderRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::temp(),
            thread_id: thread_id.into(),
            sender_role,
            content: content.into(),
            created_at: Utc::now(),
            optimistic: true,
        }
    }

    /// Synthetic system line recording that a ticket was closed
    pub fn closure_notice(thread_id: &str, closed_by: Option<&str>) -> Self {
        let content = match closed_by {
            Some(who) => format!("Ticket closed by {}", who),
            None => "Ticket closed".to_string(),
        };
        Self {
            id: MessageId::closure(thread_id),
            thread_id: thread_id.to_string(),
            sender_role: SenderRole::System,
            content,
            created_at: Utc::now(),
            optimistic: false,
        }
    }
}
