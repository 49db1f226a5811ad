//! Buffer for streaming updates that arrive before their entity is loaded

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::models::DepartmentPatch;

/// A buffered partial update waiting for its entity to appear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    pub fields: DepartmentPatch,
    pub received_at: DateTime<Utc>,
}

/// Partial updates keyed by entity id; each entry is consumed at most once
#[derive(Debug, Default)]
pub struct PendingUpdateBuffer {
    entries: HashMap<String, PendingUpdate>,
}

impl PendingUpdateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a partial for `entity_id`, overlaying any buffered partial
    pub fn record(&mut self, entity_id: &str, fields: DepartmentPatch) {
        let now = Utc::now();
        match self.entries.get_mut(entity_id) {
            Some(existing) => {
                existing.fields.merge(fields);
                existing.received_at = now;
            }
            None => {
                self.entries.insert(
                    entity_id.to_string(),
                    PendingUpdate {
                        fields,
                        received_at: now,
                    },
                );
            }
        }
        tracing::debug!(entity_id, "Buffered update for unloaded entity");
    }

    /// Take the buffered partial for `entity_id`, clearing it
    pub fn consume(&mut self, entity_id: &str) -> Option<DepartmentPatch> {
        self.entries.remove(entity_id).map(|pending| pending.fields)
    }

    pub fn get(&self, entity_id: &str) -> Option<&PendingUpdate> {
        self.entries.get(entity_id)
    }

    pub fn contains(&self, entity_id: &str) -> bool {
        self.entries.contains_key(entity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
