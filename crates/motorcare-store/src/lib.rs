//! # Motorcare Store
//!
//! `RecordStore` backends. `SqliteStore` is the production store;
//! `MemoryStore` backs engine tests and local experiments.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
