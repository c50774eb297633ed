//! In-memory record store — no persistence, used by tests and demos.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use motorcare_core::error::{MotorcareError, Result};
use motorcare_core::traits::RecordStore;
use motorcare_core::types::MaintenanceRecord;

/// Vec-backed store behind a mutex. Conditional updates hold the lock for
/// the whole read-check-write, so they are atomic per record.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<MaintenanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<MaintenanceRecord>>> {
        self.records
            .lock()
            .map_err(|e| MotorcareError::Store(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn insert(&self, record: &MaintenanceRecord) -> Result<()> {
        self.lock()?.push(record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MaintenanceRecord>> {
        Ok(self.lock()?.iter().find(|r| r.id == id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<MaintenanceRecord>> {
        let mut records = self.lock()?.clone();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn find_due_for_opt_in(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| {
                !r.opt_in_sent && r.created_at >= window_start && r.created_at <= window_end
            })
            .cloned()
            .collect())
    }

    async fn find_due_for_reminder(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|r| {
                r.opt_in_sent
                    && !r.reminder_sent
                    && r.opt_in_sent_at
                        .is_some_and(|at| at > window_start && at <= window_end)
            })
            .cloned()
            .collect())
    }

    async fn mark_opt_in_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool> {
        let mut records = self.lock()?;
        match records.iter_mut().find(|r| r.id == id && !r.opt_in_sent) {
            Some(r) => {
                r.opt_in_sent = true;
                r.opt_in_sent_at = Some(sent_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_reminder_sent(&self, id: &str) -> Result<bool> {
        let mut records = self.lock()?;
        match records.iter_mut().find(|r| r.id == id && !r.reminder_sent) {
            Some(r) => {
                r.reminder_sent = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
