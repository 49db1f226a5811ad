//! WebSocket message types for the queue sync protocol
//!
//! Outbound frames are channel signals and read receipts. Inbound frames are
//! parsed loosely (ids optional) and then checked into typed [`InboundEvent`]s,
//! so a frame without identity is rejected as a malformed record instead of
//! failing the whole connection.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::models::{ChannelKind, DepartmentPatch, DepartmentUpdate, Message, MessageId, QueueAction};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Subscribe to a department's queue room
    JoinDepartment { department_id: String },
    /// Unsubscribe from a department's queue room
    LeaveDepartment { department_id: String },
    /// Subscribe to a ticket thread room
    JoinThread { thread_id: String },
    /// Unsubscribe from a ticket thread room
    LeaveThread { thread_id: String },
    /// Read receipt for messages in a thread
    MarkRead {
        thread_id: String,
        message_ids: Vec<MessageId>,
    },
}

impl ClientMessage {
    pub fn join(kind: ChannelKind, id: &str) -> Self {
        match kind {
            ChannelKind::Department => ClientMessage::JoinDepartment {
                department_id: id.to_string(),
            },
            ChannelKind::Thread => ClientMessage::JoinThread {
                thread_id: id.to_string(),
            },
        }
    }

    pub fn leave(kind: ChannelKind, id: &str) -> Self {
        match kind {
            ChannelKind::Department => ClientMessage::LeaveDepartment {
                department_id: id.to_string(),
            },
            ChannelKind::Thread => ClientMessage::LeaveThread {
                thread_id: id.to_string(),
            },
        }
    }
}

/// Message payload as pushed by the server; every field may be missing
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    #[serde(default)]
    pub id: Option<MessageId>,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub sender_role: crate::models::SenderRole,
    #[serde(default)]
    pub content: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Messages from server to client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A department's queue changed
    DepartmentUpdated {
        #[serde(default)]
        department_id: Option<String>,
        #[serde(default)]
        action: Option<QueueAction>,
        #[serde(flatten)]
        patch: DepartmentPatch,
    },
    /// A message was posted to a thread
    MessageCreated { message: WireMessage },
    /// A ticket thread was closed
    ThreadClosed {
        #[serde(default)]
        thread_id: Option<String>,
        #[serde(default)]
        closed_by: Option<String>,
    },
    /// Server-side error notice
    Error { message: String },
}

/// Typed event name used for handler registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    DepartmentUpdated,
    MessageCreated,
    ThreadClosed,
    ServerError,
}

/// An event entering the core, after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Connected,
    Disconnected,
    DepartmentUpdated(DepartmentUpdate),
    MessageCreated(Message),
    ThreadClosed {
        thread_id: String,
        closed_by: Option<String>,
    },
    ServerError { message: String },
}

impl InboundEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::Connected => EventKind::Connected,
            InboundEvent::Disconnected => EventKind::Disconnected,
            InboundEvent::DepartmentUpdated(_) => EventKind::DepartmentUpdated,
            InboundEvent::MessageCreated(_) => EventKind::MessageCreated,
            InboundEvent::ThreadClosed { .. } => EventKind::ThreadClosed,
            InboundEvent::ServerError { .. } => EventKind::ServerError,
        }
    }

    /// Parse a raw text frame into a typed event
    pub fn from_frame(text: &str) -> Result<Self> {
        let msg: ServerMessage = serde_json::from_str(text)?;
        Self::try_from(msg)
    }
}

fn require(field: Option<String>, what: &str) -> Result<String> {
    match field {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SyncError::MalformedRecord(format!("{} is missing", what))),
    }
}

impl TryFrom<ServerMessage> for InboundEvent {
    type Error = SyncError;

    fn try_from(msg: ServerMessage) -> Result<Self> {
        match msg {
            ServerMessage::DepartmentUpdated {
                department_id,
                action,
                patch,
            } => Ok(InboundEvent::DepartmentUpdated(DepartmentUpdate {
                department_id: require(department_id, "department_updated.department_id")?,
                action,
                patch,
            })),
            ServerMessage::MessageCreated { message } => {
                let id = message
                    .id
                    .filter(|id| !id.as_str().is_empty())
                    .ok_or_else(|| {
                        SyncError::MalformedRecord("message_created.message.id is missing".into())
                    })?;
                let thread_id = require(message.thread_id, "message_created.message.thread_id")?;
                Ok(InboundEvent::MessageCreated(Message {
                    id,
                    thread_id,
                    sender_role: message.sender_role,
                    content: message.content,
                    created_at: message.created_at,
                    optimistic: false,
                }))
            }
            ServerMessage::ThreadClosed {
                thread_id,
                closed_by,
            } => Ok(InboundEvent::ThreadClosed {
                thread_id: require(thread_id, "thread_closed.thread_id")?,
                closed_by,
            }),
            ServerMessage::Error { message } => Ok(InboundEvent::ServerError { message }),
        }
    }
}
