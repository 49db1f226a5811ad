//! Session configuration, read from the environment

use std::time::Duration;

use crate::models::SenderRole;
use crate::transport::ReconnectPolicy;

/// Settings for a sync session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the REST API
    pub api_url: String,
    /// WebSocket endpoint for live events
    pub ws_url: String,
    /// How often the department snapshot is re-fetched
    pub refresh_interval: Duration,
    /// Reconnect backoff bounds
    pub reconnect: ReconnectPolicy,
    /// Re-fetch the snapshot after a token is called
    pub resync_on_call: bool,
    /// Extra backlog fetches while an acknowledged send has no server copy
    pub backlog_retries: u32,
    /// Wait before each of those fetches
    pub backlog_retry_delay: Duration,
    /// Role this client sends messages as
    pub local_role: SenderRole,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            ws_url: "ws://localhost:3000/ws".to_string(),
            refresh_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            resync_on_call: true,
            backlog_retries: 3,
            backlog_retry_delay: Duration::from_secs(2),
            local_role: SenderRole::Staff,
        }
    }
}

impl SyncConfig {
    /// Load from `CLINIC_*` environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CLINIC_API_URL") {
            config.api_url = url;
        }
        if let Some(url) = lookup("CLINIC_WS_URL") {
            config.ws_url = url;
        }
        if let Some(secs) = lookup("CLINIC_REFRESH_SECS") {
            match secs.parse::<u64>() {
                Ok(secs) if secs > 0 => config.refresh_interval = Duration::from_secs(secs),
                _ => tracing::warn!("Ignoring invalid CLINIC_REFRESH_SECS: {}", secs),
            }
        }
        if let Some(flag) = lookup("CLINIC_RESYNC_ON_CALL") {
            match flag.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => config.resync_on_call = true,
                "0" | "false" | "no" => config.resync_on_call = false,
                _ => tracing::warn!("Ignoring invalid CLINIC_RESYNC_ON_CALL: {}", flag),
            }
        }
        if let Some(retries) = lookup("CLINIC_BACKLOG_RETRIES") {
            match retries.parse::<u32>() {
                Ok(retries) => config.backlog_retries = retries,
                Err(_) => tracing::warn!("Ignoring invalid CLINIC_BACKLOG_RETRIES: {}", retries),
            }
        }
        if let Some(role) = lookup("CLINIC_ROLE") {
            match role.parse() {
                Ok(role) => config.local_role = role,
                Err(e) => tracing::warn!("Ignoring CLINIC_ROLE: {}", e),
            }
        }

        config
    }
}
