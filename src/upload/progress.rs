//! Push progress records keyed by descriptor reference key

use crate::digest::Digest;
use crate::error::{RegistryError, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

/// Transfer state of one descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub reference: String,
    /// Bytes accepted so far
    pub offset: u64,
    pub total: u64,
    pub expected: Option<Digest>,
    pub started_at: Option<SystemTime>,
    pub updated_at: Option<SystemTime>,
    pub committed: bool,
    /// Last failure seen for this transfer
    pub error: Option<String>,
}

impl Status {
    /// Fresh record for a transfer that is about to begin
    pub fn started(reference: &str, total: u64, expected: Option<Digest>) -> Self {
        Self {
            reference: reference.to_string(),
            total,
            expected,
            started_at: Some(SystemTime::now()),
            ..Default::default()
        }
    }

    /// Record for content the registry already holds
    pub fn exists(reference: &str, total: u64, expected: Option<Digest>) -> Self {
        Self {
            reference: reference.to_string(),
            offset: total,
            total,
            expected,
            updated_at: Some(SystemTime::now()),
            committed: true,
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.committed && self.error.is_none()
    }
}

/// Shared store of transfer records.
///
/// Implementations must tolerate concurrent access from independent writers.
pub trait StatusTracker: Send + Sync {
    /// Fails with `NotFound` when nothing is recorded under `key`
    fn get_status(&self, key: &str) -> Result<Status>;

    fn set_status(&self, key: &str, status: Status);
}

/// Process-local tracker backed by a map
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    statuses: Mutex<HashMap<String, Status>>,
}

impl InMemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusTracker for InMemoryTracker {
    fn get_status(&self, key: &str) -> Result<Status> {
        let statuses = self.statuses.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        statuses
            .get(key)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(format!("status for ref {}", key)))
    }

    fn set_status(&self, key: &str, status: Status) {
        let mut statuses = self.statuses.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        statuses.insert(key.to_string(), status);
    }
}

/// Read-modify-write of one record, starting from an empty record when none exists
pub(crate) fn update_status(tracker: &dyn StatusTracker, key: &str, update: impl FnOnce(&mut Status)) {
    let mut status = tracker.get_status(key).unwrap_or_else(|_| Status {
        reference: key.to_string(),
        ..Default::default()
    });
    update(&mut status);
    tracker.set_status(key, status);
}
