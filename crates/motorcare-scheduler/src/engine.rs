//! Reminder engine — the two-pass scan that sends due messages.
//!
//! Each run queries the store for records due for an opt-in or a reminder,
//! sends via the gateway, and commits the flag flip only after a confirmed
//! send. The flag update is a conditional (compare-and-set) store write, so
//! overlapping runs cannot flip a flag twice. Delivery is therefore
//! at-least-once: a crash between a successful send and the flag commit can
//! duplicate one message on the next eligible run.
//!
//! Per-record failures are logged and never abort the batch. Only a failed
//! store query or a fatal gateway error (missing/rejected credentials)
//! abandons the run; the next tick retries whatever is still in window.

use std::sync::Arc;

use motorcare_core::config::ReminderConfig;
use motorcare_core::error::Result;
use motorcare_core::traits::{Clock, MessagingGateway, RecordStore};
use motorcare_core::types::MaintenanceRecord;

use crate::policy::{self, Action};

/// Summary of one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub opt_in_candidates: usize,
    pub opt_ins_sent: usize,
    pub opt_in_failures: usize,
    pub reminder_candidates: usize,
    pub reminders_sent: usize,
    pub reminder_failures: usize,
    /// Conditional updates that did not apply (another run got there first).
    pub races_lost: usize,
}

impl RunReport {
    /// True when the run had nothing to do.
    pub fn is_quiet(&self) -> bool {
        self.opt_in_candidates == 0 && self.reminder_candidates == 0
    }
}

/// The reminder scheduling engine. Owns no state of its own — all record
/// state lives in the store, so any number of restarts are safe.
pub struct ReminderEngine {
    store: Arc<dyn RecordStore>,
    gateway: Arc<dyn MessagingGateway>,
    clock: Arc<dyn Clock>,
    windows: ReminderConfig,
}

impl ReminderEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        gateway: Arc<dyn MessagingGateway>,
        clock: Arc<dyn Clock>,
        windows: ReminderConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            windows,
        }
    }

    /// Run both passes once. The periodic loop calls this on every tick;
    /// tests call it directly with a pinned clock.
    pub async fn run_once(&self) -> Result<RunReport> {
        let mut report = RunReport::default();
        self.opt_in_pass(&mut report).await?;
        self.reminder_pass(&mut report).await?;
        Ok(report)
    }

    /// Pass 1 — send opt-in confirmations to recently created records.
    async fn opt_in_pass(&self, report: &mut RunReport) -> Result<()> {
        let now = self.clock.now();
        let candidates = self
            .store
            .find_due_for_opt_in(now - self.windows.opt_in_window(), now)
            .await?;
        report.opt_in_candidates = candidates.len();
        if !candidates.is_empty() {
            tracing::info!("Found {} record(s) due for opt-in", candidates.len());
        }

        for record in &candidates {
            // Re-check against the policy so a record mutated since the
            // query (or returned at a window edge) is not sent to.
            if policy::decide(record, self.clock.now(), &self.windows) != Action::SendOptIn {
                continue;
            }
            match self
                .gateway
                .send_opt_in(&record.owner_phone, &record.registration)
                .await
            {
                Ok(receipt) => {
                    report.opt_ins_sent += 1;
                    tracing::info!(
                        "Opt-in sent for {} (message_id={})",
                        record.registration,
                        receipt.message_id
                    );
                    self.commit_opt_in(record, report).await;
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Aborting run, gateway misconfigured: {e}");
                    return Err(e);
                }
                Err(e) => {
                    report.opt_in_failures += 1;
                    tracing::warn!("Opt-in failed for {}: {e}", record.registration);
                }
            }
        }
        Ok(())
    }

    /// Pass 2 — send service reminders to records whose opt-in delay has
    /// elapsed but whose reminder window is still open.
    async fn reminder_pass(&self, report: &mut RunReport) -> Result<()> {
        let now = self.clock.now();
        let delay = self.windows.reminder_delay();
        let candidates = self
            .store
            .find_due_for_reminder(now - delay - self.windows.reminder_window(), now - delay)
            .await?;
        report.reminder_candidates = candidates.len();
        if !candidates.is_empty() {
            tracing::info!("Found {} record(s) due for reminder", candidates.len());
        }

        for record in &candidates {
            if policy::decide(record, self.clock.now(), &self.windows) != Action::SendReminder {
                continue;
            }
            match self
                .gateway
                .send_reminder(
                    &record.owner_phone,
                    &record.registration,
                    &record.next_service_display(),
                )
                .await
            {
                Ok(receipt) => {
                    report.reminders_sent += 1;
                    tracing::info!(
                        "Reminder sent for {} (message_id={})",
                        record.registration,
                        receipt.message_id
                    );
                    match self.store.mark_reminder_sent(&record.id).await {
                        Ok(true) => {}
                        Ok(false) => {
                            report.races_lost += 1;
                            tracing::debug!(
                                "Reminder flag for {} already set, skipping",
                                record.id
                            );
                        }
                        Err(e) => {
                            tracing::warn!("Failed to mark reminder sent for {}: {e}", record.id)
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Aborting run, gateway misconfigured: {e}");
                    return Err(e);
                }
                Err(e) => {
                    report.reminder_failures += 1;
                    tracing::warn!("Reminder failed for {}: {e}", record.registration);
                }
            }
        }
        Ok(())
    }

    /// Commit both opt-in fields together after a confirmed send.
    async fn commit_opt_in(&self, record: &MaintenanceRecord, report: &mut RunReport) {
        match self
            .store
            .mark_opt_in_sent(&record.id, self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                report.races_lost += 1;
                tracing::debug!("Opt-in flag for {} already set, skipping", record.id);
            }
            Err(e) => tracing::warn!("Failed to mark opt-in sent for {}: {e}", record.id),
        }
    }
}

/// Spawn the reminder loop as a background tokio task. Decoupled from the
/// engine so tests can drive `run_once` directly with an injected clock.
pub async fn spawn_reminder_loop(engine: Arc<ReminderEngine>, check_interval_secs: u64) {
    tracing::info!("Reminder scheduler started (check every {check_interval_secs}s)");
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(check_interval_secs));

    loop {
        interval.tick().await;
        match engine.run_once().await {
            Ok(report) if report.is_quiet() => {
                tracing::debug!("Reminder check completed, nothing due");
            }
            Ok(report) => {
                tracing::info!(
                    "Reminder check completed: {}/{} opt-ins, {}/{} reminders sent",
                    report.opt_ins_sent,
                    report.opt_in_candidates,
                    report.reminders_sent,
                    report.reminder_candidates
                );
            }
            Err(e) => {
                tracing::error!("Reminder run failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use motorcare_core::error::MotorcareError;
    use motorcare_core::traits::SendReceipt;
    use motorcare_store::MemoryStore;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Clock pinned to a settable instant.
    struct FixedClock {
        now: Mutex<DateTime<Utc>>,
    }

    impl FixedClock {
        fn at(t: DateTime<Utc>) -> Arc<Self> {
            Arc::new(Self { now: Mutex::new(t) })
        }

        fn set(&self, t: DateTime<Utc>) {
            *self.now.lock().unwrap() = t;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        OptIn(String),
        Reminder(String, String),
    }

    /// Gateway that records every call and fails while scripted failures
    /// remain queued.
    #[derive(Default)]
    struct ScriptedGateway {
        calls: Mutex<Vec<Call>>,
        failures: Mutex<VecDeque<MotorcareError>>,
    }

    impl ScriptedGateway {
        fn ok() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn fail_next(&self, err: MotorcareError) {
            self.failures.lock().unwrap().push_back(err);
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn outcome(&self, to: &str) -> Result<SendReceipt> {
            match self.failures.lock().unwrap().pop_front() {
                Some(err) => Err(err),
                None => Ok(SendReceipt {
                    message_id: format!("wamid.{}", self.calls.lock().unwrap().len()),
                    to: to.to_string(),
                }),
            }
        }
    }

    #[async_trait::async_trait]
    impl MessagingGateway for ScriptedGateway {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn verify(&self) -> Result<()> {
            Ok(())
        }

        async fn send_opt_in(&self, phone: &str, registration: &str) -> Result<SendReceipt> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::OptIn(registration.to_string()));
            self.outcome(phone)
        }

        async fn send_reminder(
            &self,
            phone: &str,
            registration: &str,
            next_service: &str,
        ) -> Result<SendReceipt> {
            self.calls
                .lock()
                .unwrap()
                .push(Call::Reminder(registration.to_string(), next_service.to_string()));
            self.outcome(phone)
        }
    }

    fn record(registration: &str, created_at: DateTime<Utc>) -> MaintenanceRecord {
        MaintenanceRecord::new(
            "Test Owner",
            registration,
            "+919876543210",
            created_at,
            10_000,
            500.0,
            Duration::days(180),
            created_at,
        )
        .unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        clock: Arc<FixedClock>,
        engine: ReminderEngine,
    }

    fn harness(t0: DateTime<Utc>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let gateway = ScriptedGateway::ok();
        let clock = FixedClock::at(t0);
        let engine = ReminderEngine::new(
            store.clone(),
            gateway.clone(),
            clock.clone(),
            ReminderConfig::default(),
        );
        Harness {
            store,
            gateway,
            clock,
            engine,
        }
    }

    fn t0() -> DateTime<Utc> {
        "2026-08-26T09:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn test_opt_in_sent_within_window() {
        // created at T0, run at T0+30s
        let h = harness(t0());
        let r = record("KA01AB1234", t0());
        h.store.insert(&r).await.unwrap();

        h.clock.set(t0() + Duration::seconds(30));
        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.opt_ins_sent, 1);
        assert_eq!(h.gateway.calls(), vec![Call::OptIn("KA01AB1234".into())]);
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(stored.opt_in_sent);
        assert_eq!(stored.opt_in_sent_at, Some(t0() + Duration::seconds(30)));
        assert!(!stored.reminder_sent);
    }

    #[tokio::test]
    async fn test_no_duplicate_opt_in_then_reminder_fires() {
        // opt-in consumed at T0+30s, next run at T0+90s
        let h = harness(t0());
        let r = record("KA01AB1234", t0());
        h.store.insert(&r).await.unwrap();

        h.clock.set(t0() + Duration::seconds(30));
        h.engine.run_once().await.unwrap();

        h.clock.set(t0() + Duration::seconds(90));
        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.opt_in_candidates, 0);
        assert_eq!(report.reminders_sent, 1);
        let calls = h.gateway.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(&calls[1], Call::Reminder(reg, _) if reg == "KA01AB1234"));
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(stored.reminder_sent);
    }

    #[tokio::test]
    async fn test_transient_failure_retried_within_window() {
        // failure at T0+30s, success at T0+50s
        let h = harness(t0());
        let r = record("KA01AB1234", t0());
        h.store.insert(&r).await.unwrap();
        h.gateway.fail_next(MotorcareError::Gateway("provider 500".into()));

        h.clock.set(t0() + Duration::seconds(30));
        let report = h.engine.run_once().await.unwrap();
        assert_eq!(report.opt_in_failures, 1);
        assert!(!h.store.get(&r.id).await.unwrap().unwrap().opt_in_sent);

        h.clock.set(t0() + Duration::seconds(50));
        let report = h.engine.run_once().await.unwrap();
        assert_eq!(report.opt_ins_sent, 1);
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(stored.opt_in_sent);
        assert_eq!(stored.opt_in_sent_at, Some(t0() + Duration::seconds(50)));
    }

    #[tokio::test]
    async fn test_window_expiry_is_terminal() {
        // every attempt fails until the window closes
        let h = harness(t0());
        let r = record("KA01AB1234", t0());
        h.store.insert(&r).await.unwrap();

        for secs in [15, 45] {
            h.gateway.fail_next(MotorcareError::Gateway("unreachable".into()));
            h.clock.set(t0() + Duration::seconds(secs));
            h.engine.run_once().await.unwrap();
        }

        // window expired, no further attempts ever
        h.clock.set(t0() + Duration::seconds(61));
        let report = h.engine.run_once().await.unwrap();
        assert!(report.is_quiet());
        assert_eq!(h.gateway.calls().len(), 2);
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(!stored.opt_in_sent);
        assert!(!stored.reminder_sent);
    }

    #[tokio::test]
    async fn test_double_run_is_idempotent() {
        let h = harness(t0());
        h.store.insert(&record("KA01AB1234", t0())).await.unwrap();

        h.clock.set(t0() + Duration::seconds(30));
        h.engine.run_once().await.unwrap();
        let report = h.engine.run_once().await.unwrap();

        // flag already flipped: no second send, no mutation
        assert_eq!(report.opt_in_candidates, 0);
        assert_eq!(h.gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_record_outside_window_untouched() {
        let h = harness(t0());
        let r = record("KA01AB1234", t0() - Duration::seconds(300));
        h.store.insert(&r).await.unwrap();

        let report = h.engine.run_once().await.unwrap();
        assert!(report.is_quiet());
        assert!(h.gateway.calls().is_empty());
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(!stored.opt_in_sent);
        assert!(stored.opt_in_sent_at.is_none());
    }

    #[tokio::test]
    async fn test_per_record_isolation() {
        // one record's failure must not stop the rest of the batch
        let h = harness(t0());
        let a = record("KA01AB1111", t0());
        let b = record("KA01AB2222", t0());
        h.store.insert(&a).await.unwrap();
        h.store.insert(&b).await.unwrap();
        h.gateway.fail_next(MotorcareError::Gateway("provider 500".into()));

        h.clock.set(t0() + Duration::seconds(10));
        let report = h.engine.run_once().await.unwrap();

        assert_eq!(report.opt_in_candidates, 2);
        assert_eq!(report.opt_ins_sent, 1);
        assert_eq!(report.opt_in_failures, 1);
        assert_eq!(h.gateway.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_fatal_gateway_error_aborts_run() {
        let h = harness(t0());
        h.store.insert(&record("KA01AB1111", t0())).await.unwrap();
        h.store.insert(&record("KA01AB2222", t0())).await.unwrap();
        h.gateway
            .fail_next(MotorcareError::Config("access token missing".into()));

        h.clock.set(t0() + Duration::seconds(10));
        let err = h.engine.run_once().await.unwrap_err();
        assert!(err.is_fatal());
        // aborted after the first failing send, second record untouched
        assert_eq!(h.gateway.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_full_lifecycle_then_quiet() {
        let h = harness(t0());
        let r = record("KA01AB1234", t0());
        h.store.insert(&r).await.unwrap();

        h.clock.set(t0() + Duration::seconds(30));
        h.engine.run_once().await.unwrap();
        h.clock.set(t0() + Duration::seconds(95));
        h.engine.run_once().await.unwrap();

        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(stored.opt_in_sent && stored.reminder_sent);

        // reminded records never transition back or resend
        for secs in [100, 130, 200] {
            h.clock.set(t0() + Duration::seconds(secs));
            let report = h.engine.run_once().await.unwrap();
            assert!(report.is_quiet());
        }
        assert_eq!(h.gateway.calls().len(), 2);
        let stored = h.store.get(&r.id).await.unwrap().unwrap();
        assert!(stored.opt_in_sent && stored.reminder_sent);
    }

    #[tokio::test]
    async fn test_batch_order_independent_final_state() {
        // same records inserted in opposite orders end in the same state
        let t = t0();
        let records = [record("KA01AB1111", t), record("KA01AB2222", t), record("KA01AB3333", t)];

        let forward = harness(t);
        for r in &records {
            forward.store.insert(r).await.unwrap();
        }
        let backward = harness(t);
        for r in records.iter().rev() {
            backward.store.insert(r).await.unwrap();
        }

        for h in [&forward, &backward] {
            h.clock.set(t + Duration::seconds(30));
            h.engine.run_once().await.unwrap();
        }

        for r in &records {
            let a = forward.store.get(&r.id).await.unwrap().unwrap();
            let b = backward.store.get(&r.id).await.unwrap().unwrap();
            assert!(a.opt_in_sent && b.opt_in_sent);
            assert_eq!(a.opt_in_sent_at, b.opt_in_sent_at);
        }
    }
}
