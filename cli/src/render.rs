//! Plain-text rendering of session state

use std::collections::HashSet;

use clinic_sync::models::{DepartmentStatus, Message, MessageId, SenderRole, Thread};
use clinic_sync::Notice;

pub fn department(status: &DepartmentStatus) -> String {
    let state = if status.is_open { "open" } else { "closed" };
    format!(
        "{:<20} {:<6} waiting {:>3}  serving {:<8} doctor {:<16} patient {}",
        status.name,
        state,
        status.waiting_count,
        status.serving_token.as_deref().unwrap_or("-"),
        status.doctor,
        status.current_patient,
    )
}

pub fn thread(thread: &Thread) -> String {
    let marker = if thread.unread { "*" } else { " " };
    let when = thread
        .last_message_at
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "{} {} [{}] {} ({}) {}",
        marker,
        thread.id,
        thread.status.as_str(),
        thread.category,
        when,
        thread.last_message.as_deref().unwrap_or(""),
    )
}

pub fn message(message: &Message) -> String {
    format!(
        "[{}] {}: {}",
        message.created_at.format("%H:%M"),
        message.sender_role.as_str(),
        message.content
    )
}

pub fn notice(notice: &Notice) -> String {
    match &notice.thread_id {
        Some(thread_id) => format!("[{}] {} ({})", notice.level.as_str(), notice.message, thread_id),
        None => format!("[{}] {}", notice.level.as_str(), notice.message),
    }
}

/// Prints each server-confirmed message once
#[derive(Default)]
pub struct Transcript {
    printed: HashSet<MessageId>,
}

impl Transcript {
    pub fn print_new(&mut self, messages: &[Message]) {
        for m in messages.iter().filter(|m| !m.optimistic) {
            if self.printed.insert(m.id.clone()) {
                println!("{}", message(m));
            }
        }
    }

    /// Ids printed so far that still need a read receipt
    pub fn unread_from(&self, messages: &[Message], local_role: SenderRole) -> Vec<MessageId> {
        messages
            .iter()
            .filter(|m| !m.optimistic && m.sender_role != local_role)
            .filter(|m| self.printed.contains(&m.id))
            .map(|m| m.id.clone())
            .collect()
    }
}
