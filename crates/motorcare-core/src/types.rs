//! Maintenance record — the core data model for reminder scheduling.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MotorcareError, Result};

/// One vehicle's service history and reminder progress.
///
/// Mutated exclusively by the reminder engine, field by field, through the
/// record store's conditional updates. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceRecord {
    /// Store-assigned id, immutable.
    pub id: String,
    /// Customer name.
    pub customer_name: String,
    /// Vehicle registration number, normalized to uppercase.
    pub registration: String,
    /// Owner WhatsApp number, E.164-like with country code.
    pub owner_phone: String,
    /// When the vehicle was last serviced.
    pub last_service_at: DateTime<Utc>,
    /// When the next service is due. Fixed at creation, never recomputed.
    pub next_service_at: DateTime<Utc>,
    /// Odometer reading at last service.
    pub meter_reading: u64,
    /// Cost of the last service.
    pub service_cost: f64,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// Whether the opt-in confirmation was successfully sent.
    #[serde(default)]
    pub opt_in_sent: bool,
    /// When the opt-in was sent. Some iff `opt_in_sent`.
    #[serde(default)]
    pub opt_in_sent_at: Option<DateTime<Utc>>,
    /// Whether the service-due reminder was successfully sent.
    #[serde(default)]
    pub reminder_sent: bool,
}

impl MaintenanceRecord {
    /// Create a new record. Trims and uppercases the registration, derives
    /// the next service date from the service interval, and starts with
    /// both message flags unset.
    pub fn new(
        customer_name: &str,
        registration: &str,
        owner_phone: &str,
        last_service_at: DateTime<Utc>,
        meter_reading: u64,
        service_cost: f64,
        service_interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let registration = registration.trim().to_uppercase();
        if registration.is_empty() {
            return Err(MotorcareError::InvalidRecord(
                "registration number is required".into(),
            ));
        }
        let owner_phone = owner_phone.trim().to_string();
        if owner_phone.is_empty() {
            return Err(MotorcareError::InvalidRecord(
                "owner WhatsApp number is required".into(),
            ));
        }
        if service_cost < 0.0 {
            return Err(MotorcareError::InvalidRecord(
                "service cost cannot be negative".into(),
            ));
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            customer_name: customer_name.trim().to_string(),
            registration,
            owner_phone,
            last_service_at,
            next_service_at: last_service_at + service_interval,
            meter_reading,
            service_cost,
            created_at: now,
            opt_in_sent: false,
            opt_in_sent_at: None,
            reminder_sent: false,
        })
    }

    /// Next service date formatted for the reminder message (dd/mm/yyyy).
    pub fn next_service_display(&self) -> String {
        self.next_service_at.format("%d/%m/%Y").to_string()
    }
}
