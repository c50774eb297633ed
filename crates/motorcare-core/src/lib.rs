//! # Motorcare Core
//!
//! Shared foundation for the Motorcare workspace: the maintenance record
//! data model, the collaborator trait seams (clock, record store, messaging
//! gateway), configuration, and the error type.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MotorcareConfig;
pub use error::{MotorcareError, Result};
pub use traits::{Clock, MessagingGateway, RecordStore, SendReceipt, SystemClock};
pub use types::MaintenanceRecord;
