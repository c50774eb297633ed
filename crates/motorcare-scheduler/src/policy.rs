//! Record lifecycle policy — pure decision logic.
//!
//! Given a record and the current time, decide which outbound message (if
//! any) is due. No storage, no transport, no side effects; the engine and
//! the store's due-queries both follow this function's window arithmetic.

use chrono::{DateTime, Duration, Utc};

use motorcare_core::config::ReminderConfig;
use motorcare_core::types::MaintenanceRecord;

/// What the scheduler should do with a record right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    NoAction,
    SendOptIn,
    SendReminder,
}

/// Decide the due action for `record` at `now`.
///
/// Opt-in fires while `now - created_at` is within `[0, opt_in_window]`.
/// The reminder fires while the time since a successful opt-in is within
/// `[reminder_delay, reminder_delay + reminder_window)`. A record whose
/// window has passed gets `NoAction` forever — stale records are terminal,
/// there is no backfill.
pub fn decide(record: &MaintenanceRecord, now: DateTime<Utc>, windows: &ReminderConfig) -> Action {
    if !record.opt_in_sent {
        let age = now - record.created_at;
        if age >= Duration::zero() && age <= windows.opt_in_window() {
            return Action::SendOptIn;
        }
        return Action::NoAction;
    }

    if !record.reminder_sent {
        if let Some(opted_in_at) = record.opt_in_sent_at {
            let since_opt_in = now - opted_in_at;
            let delay = windows.reminder_delay();
            if since_opt_in >= delay && since_opt_in < delay + windows.reminder_window() {
                return Action::SendReminder;
            }
        }
        return Action::NoAction;
    }

    Action::NoAction
}
