//! # Motorcare Scheduler
//!
//! The reminder scheduling state machine. Each record moves through two
//! one-way message phases, each gated by a bounded time window:
//!
//! ```text
//! [Created] --(opt-in window, send ok)--> [OptedIn]
//! [OptedIn] --(reminder window, send ok)--> [Reminded]
//! [Created]/[OptedIn] --(window expires)--> stale, never retried
//! ```
//!
//! `policy` is the pure decision function; `engine` wires it to the store,
//! the gateway, and the clock, and owns the periodic run loop.

pub mod engine;
pub mod policy;

pub use engine::{spawn_reminder_loop, ReminderEngine, RunReport};
pub use policy::{decide, Action};
