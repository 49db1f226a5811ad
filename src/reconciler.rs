//! Snapshot reconciliation
//!
//! Merges a freshly fetched department snapshot with the state already held
//! and any buffered streaming updates. The snapshot decides which departments
//! exist and their authoritative fields (open flag, waiting count, serving
//! token). Volatile fields (doctor, current patient) are resolved per field:
//!
//! 1. a buffered streaming value for that department, consumed here;
//! 2. else the previously held value, unless it is a placeholder;
//! 3. else whatever the snapshot says.
//!
//! A queue that was open and is now closed resets its volatile fields to the
//! placeholder regardless of the above.

use std::collections::{HashMap, HashSet};

use crate::models::{DepartmentStatus, SnapshotRecord, PLACEHOLDER};
use crate::pending::PendingUpdateBuffer;

const PLACEHOLDER_VALUES: [&str; 6] = ["-", "assigned", "unassigned", "none", "n/a", "tbd"];

/// Whether a volatile value carries no real information
pub fn is_placeholder(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || PLACEHOLDER_VALUES
            .iter()
            .any(|p| value.eq_ignore_ascii_case(p))
}

fn resolve(pending: Option<String>, previous: Option<&str>, snapshot: Option<String>) -> String {
    if let Some(value) = pending {
        return value;
    }
    if let Some(value) = previous.filter(|v| !is_placeholder(v)) {
        return value.to_string();
    }
    snapshot.unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Build the new department state from `previous`, a fresh snapshot and the
/// pending buffer. Records without an id are skipped. Buffer entries whose
/// department is not in the snapshot stay buffered.
pub fn reconcile(
    previous: &[DepartmentStatus],
    snapshot: Vec<SnapshotRecord>,
    pending: &mut PendingUpdateBuffer,
) -> Vec<DepartmentStatus> {
    let by_id: HashMap<&str, &DepartmentStatus> =
        previous.iter().map(|d| (d.id.as_str(), d)).collect();
    let mut seen = HashSet::new();
    let mut next = Vec::with_capacity(snapshot.len());

    for record in snapshot {
        let id = match record.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                tracing::warn!(name = %record.name, "Skipping snapshot record without id");
                continue;
            }
        };
        if !seen.insert(id.clone()) {
            tracing::warn!(id = %id, "Skipping duplicate snapshot record");
            continue;
        }

        let prior = by_id.get(id.as_str()).copied();
        let buffered = pending.consume(&id).unwrap_or_default();
        let just_closed = prior.is_some_and(|p| p.is_open) && !record.is_open;

        let (doctor, current_patient) = if just_closed {
            tracing::debug!(id = %id, "Queue closed, resetting volatile fields");
            (PLACEHOLDER.to_string(), PLACEHOLDER.to_string())
        } else {
            (
                resolve(
                    buffered.doctor,
                    prior.map(|p| p.doctor.as_str()),
                    record.doctor,
                ),
                resolve(
                    buffered.current_patient,
                    prior.map(|p| p.current_patient.as_str()),
                    record.current_patient,
                ),
            )
        };

        next.push(DepartmentStatus {
            id,
            name: record.name,
            is_open: record.is_open,
            waiting_count: record.waiting_count,
            serving_token: record.serving_token,
            doctor,
            current_patient,
        });
    }

    let dropped = previous.iter().filter(|d| !seen.contains(&d.id)).count();
    if dropped > 0 {
        tracing::debug!(dropped, "Departments absent from snapshot removed");
    }
    next
}
