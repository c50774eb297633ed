//! SQLite record store — the production backend.
//!
//! Timestamps are stored as fixed-precision RFC 3339 UTC strings so the
//! windowed due-queries can use plain text comparison. The `mark_*` updates
//! are `UPDATE ... WHERE flag = 0`, so a flag flips at most once even if
//! two scheduler runs overlap.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use motorcare_core::error::{MotorcareError, Result};
use motorcare_core::traits::RecordStore;
use motorcare_core::types::MaintenanceRecord;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn store_err(e: impl std::fmt::Display) -> MotorcareError {
    MotorcareError::Store(e.to_string())
}

fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| store_err(format!("bad timestamp {s:?}: {e}")))
}

impl SqliteStore {
    /// Open (or create) the store at the given path.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(store_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                customer_name TEXT NOT NULL,
                registration TEXT NOT NULL,
                owner_phone TEXT NOT NULL,
                last_service_at TEXT NOT NULL,
                next_service_at TEXT NOT NULL,
                meter_reading INTEGER NOT NULL,
                service_cost REAL NOT NULL,
                created_at TEXT NOT NULL,
                opt_in_sent INTEGER NOT NULL DEFAULT 0,
                opt_in_sent_at TEXT,
                reminder_sent INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_records_opt_in
                ON records (opt_in_sent, created_at);
            CREATE INDEX IF NOT EXISTS idx_records_reminder
                ON records (reminder_sent, opt_in_sent, opt_in_sent_at);",
        )
        .map_err(store_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| store_err(format!("lock poisoned: {e}")))
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRecord> {
        Ok(RawRecord {
            id: row.get(0)?,
            customer_name: row.get(1)?,
            registration: row.get(2)?,
            owner_phone: row.get(3)?,
            last_service_at: row.get(4)?,
            next_service_at: row.get(5)?,
            meter_reading: row.get(6)?,
            service_cost: row.get(7)?,
            created_at: row.get(8)?,
            opt_in_sent: row.get(9)?,
            opt_in_sent_at: row.get(10)?,
            reminder_sent: row.get(11)?,
        })
    }

    fn query_records(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<MaintenanceRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(store_err)?;
        let rows = stmt
            .query_map(params, Self::row_to_record)
            .map_err(store_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(store_err)?;
        drop(stmt);
        drop(conn);
        rows.into_iter().map(RawRecord::into_record).collect()
    }
}

/// Row image before timestamp parsing.
struct RawRecord {
    id: String,
    customer_name: String,
    registration: String,
    owner_phone: String,
    last_service_at: String,
    next_service_at: String,
    meter_reading: i64,
    service_cost: f64,
    created_at: String,
    opt_in_sent: bool,
    opt_in_sent_at: Option<String>,
    reminder_sent: bool,
}

impl RawRecord {
    fn into_record(self) -> Result<MaintenanceRecord> {
        Ok(MaintenanceRecord {
            id: self.id,
            customer_name: self.customer_name,
            registration: self.registration,
            owner_phone: self.owner_phone,
            last_service_at: parse_ts(&self.last_service_at)?,
            next_service_at: parse_ts(&self.next_service_at)?,
            meter_reading: self.meter_reading.max(0) as u64,
            service_cost: self.service_cost,
            created_at: parse_ts(&self.created_at)?,
            opt_in_sent: self.opt_in_sent,
            opt_in_sent_at: self.opt_in_sent_at.as_deref().map(parse_ts).transpose()?,
            reminder_sent: self.reminder_sent,
        })
    }
}

const SELECT_COLS: &str = "SELECT id, customer_name, registration, owner_phone, \
    last_service_at, next_service_at, meter_reading, service_cost, created_at, \
    opt_in_sent, opt_in_sent_at, reminder_sent FROM records";

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, record: &MaintenanceRecord) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (id, customer_name, registration, owner_phone,
                last_service_at, next_service_at, meter_reading, service_cost,
                created_at, opt_in_sent, opt_in_sent_at, reminder_sent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            rusqlite::params![
                record.id,
                record.customer_name,
                record.registration,
                record.owner_phone,
                ts(record.last_service_at),
                ts(record.next_service_at),
                record.meter_reading as i64,
                record.service_cost,
                ts(record.created_at),
                record.opt_in_sent,
                record.opt_in_sent_at.map(ts),
                record.reminder_sent,
            ],
        )
        .map_err(store_err)?;
        tracing::debug!("Record stored: {} ({})", record.registration, record.id);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<MaintenanceRecord>> {
        let mut found = self.query_records(&format!("{SELECT_COLS} WHERE id = ?1"), &[&id])?;
        Ok(found.pop())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<MaintenanceRecord>> {
        self.query_records(
            &format!("{SELECT_COLS} ORDER BY created_at DESC LIMIT ?1"),
            &[&(limit as i64)],
        )
    }

    async fn find_due_for_opt_in(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        self.query_records(
            &format!(
                "{SELECT_COLS} WHERE opt_in_sent = 0 \
                 AND created_at >= ?1 AND created_at <= ?2"
            ),
            &[&ts(window_start), &ts(window_end)],
        )
    }

    async fn find_due_for_reminder(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<MaintenanceRecord>> {
        self.query_records(
            &format!(
                "{SELECT_COLS} WHERE opt_in_sent = 1 AND reminder_sent = 0 \
                 AND opt_in_sent_at > ?1 AND opt_in_sent_at <= ?2"
            ),
            &[&ts(window_start), &ts(window_end)],
        )
    }

    async fn mark_opt_in_sent(&self, id: &str, sent_at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE records SET opt_in_sent = 1, opt_in_sent_at = ?2
                 WHERE id = ?1 AND opt_in_sent = 0",
                rusqlite::params![id, ts(sent_at)],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }

    async fn mark_reminder_sent(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE records SET reminder_sent = 1
                 WHERE id = ?1 AND reminder_sent = 0",
                rusqlite::params![id],
            )
            .map_err(store_err)?;
        Ok(changed > 0)
    }
}
