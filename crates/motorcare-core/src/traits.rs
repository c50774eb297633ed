//! Collaborator trait seams: clock, record store, messaging gateway.
//!
//! The reminder engine is written against these traits only, so it can be
//! tested with an in-memory store, a scripted gateway, and a fixed clock.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::MaintenanceRecord;

/// Time source. Injected so scheduler tests can pin `now`.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Persistence for maintenance records.
///
/// The `mark_*` updates are conditional: they apply only when the flag is
/// still unset and report whether they applied. That keeps overlapping
/// scheduler runs from double-flipping a flag.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist a new record.
    async fn insert(&self, record: &MaintenanceRecord) -> Result<()>;

    /// Fetch one record by id.
    async fn get(&self, id: &str) -> Result<Option<MaintenanceRecord>>;

    /// Most recently created records, newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<MaintenanceRecord>>;

    /// Records with `opt_in_sent = false` created within
    /// `[window_start, window_end]`.
    async fn find_due_for_opt_in(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>>;

    /// Records with `opt_in_sent = true`, `reminder_sent = false`, and
    /// `opt_in_sent_at` within `(window_start, window_end]`. The end is
    /// inclusive so a reminder becomes due the instant the delay elapses.
    async fn find_due_for_reminder(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>>;

    /// Set `opt_in_sent = true` and `opt_in_sent_at = sent_at` together,
    /// only if `opt_in_sent` is still false. Returns whether the update
    /// applied.
    async fn mark_opt_in_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool>;

    /// Set `reminder_sent = true`, only if it is still false. Returns
    /// whether the update applied.
    async fn mark_reminder_sent(&self, id: &str) -> Result<bool>;
}

/// Receipt for a successfully delivered message.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-assigned message id.
    pub message_id: String,
    /// Recipient phone number.
    pub to: String,
}

/// Outbound messaging provider (WhatsApp Cloud API, Twilio, ...).
///
/// Implementations are interchangeable; the engine only branches on
/// success/failure plus the fatal credential class (`is_fatal`).
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Provider name for logs.
    fn name(&self) -> &str;

    /// Check credentials against the provider. Called once at startup so a
    /// misconfigured gateway fails fast instead of failing every record.
    async fn verify(&self) -> Result<()>;

    /// Send the opt-in confirmation for a newly registered vehicle.
    async fn send_opt_in(&self, phone: &str, registration: &str) -> Result<SendReceipt>;

    /// Send the service-due reminder. `next_service` is already formatted
    /// for display.
    async fn send_reminder(
        &self,
        phone: &str,
        registration: &str,
        next_service: &str,
    ) -> Result<SendReceipt>;
}
