//! Department board: the client's view of every department queue

use crate::models::{DepartmentStatus, DepartmentUpdate, SnapshotRecord, PLACEHOLDER};
use crate::pending::PendingUpdateBuffer;
use crate::reconciler;

/// What happened to a streaming update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDisposition {
    /// Applied to a department already on the board
    Applied,
    /// Department not loaded yet; held for the next snapshot
    Buffered,
}

/// Owner of the department state map and its pending buffer
#[derive(Debug, Default)]
pub struct DepartmentBoard {
    departments: Vec<DepartmentStatus>,
    pending: PendingUpdateBuffer,
    issued_fetches: u64,
    applied_fetch: u64,
}

impl DepartmentBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn departments(&self) -> &[DepartmentStatus] {
        &self.departments
    }

    pub fn get(&self, id: &str) -> Option<&DepartmentStatus> {
        self.departments.iter().find(|d| d.id == id)
    }

    pub fn pending(&self) -> &PendingUpdateBuffer {
        &self.pending
    }

    /// Ticket for a snapshot fetch about to be issued
    pub fn begin_fetch(&mut self) -> u64 {
        self.issued_fetches += 1;
        self.issued_fetches
    }

    /// Apply the result of fetch `seq`. A completion older than one already
    /// applied is discarded. Returns whether the snapshot was applied.
    pub fn apply_snapshot(&mut self, seq: u64, records: Vec<SnapshotRecord>) -> bool {
        if seq <= self.applied_fetch {
            tracing::debug!(seq, applied = self.applied_fetch, "Discarding stale snapshot");
            return false;
        }
        self.applied_fetch = seq;
        self.departments = reconciler::reconcile(&self.departments, records, &mut self.pending);
        true
    }

    /// Apply a streaming update, or buffer it if the department is unknown
    pub fn apply_update(&mut self, update: &DepartmentUpdate) -> UpdateDisposition {
        let Some(department) = self
            .departments
            .iter_mut()
            .find(|d| d.id == update.department_id)
        else {
            self.pending
                .record(&update.department_id, update.patch.clone());
            return UpdateDisposition::Buffered;
        };

        let patch = &update.patch;
        if let Some(count) = patch.waiting_count {
            department.waiting_count = count;
        }
        if let Some(token) = &patch.serving_token {
            department.serving_token = Some(token.clone());
        }
        if let Some(doctor) = &patch.doctor {
            department.doctor = doctor.clone();
        }
        if let Some(patient) = &patch.current_patient {
            department.current_patient = patient.clone();
        }
        if let Some(is_open) = patch.is_open {
            let closing = department.is_open && !is_open;
            department.is_open = is_open;
            if closing {
                department.doctor = PLACEHOLDER.to_string();
                department.current_patient = PLACEHOLDER.to_string();
            }
        }

        tracing::debug!(
            id = %update.department_id,
            action = ?update.action,
            "Applied live department update"
        );
        UpdateDisposition::Applied
    }
}
