//! Clinic sync - real-time client core for hospital queues and support tickets

pub mod api;
pub mod channels;
pub mod config;
pub mod departments;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod messages;
pub mod models;
pub mod pending;
pub mod protocol;
pub mod reconciler;
pub mod session;
pub mod transport;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use session::{Command, Input, Notice, NoticeLevel, SyncSession};
