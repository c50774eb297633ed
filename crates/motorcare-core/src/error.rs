//! Motorcare error type.

use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, MotorcareError>;

/// All errors surfaced by Motorcare components.
#[derive(Debug, Error)]
pub enum MotorcareError {
    /// Configuration is missing or invalid. Aborts a scheduler run early
    /// instead of failing every record individually.
    #[error("Config error: {0}")]
    Config(String),

    /// Record store query or update failed.
    #[error("Store error: {0}")]
    Store(String),

    /// Messaging gateway call failed. The reason is an opaque string from
    /// the underlying transport; callers only branch on success/failure.
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Gateway credentials were rejected by the provider.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// Invalid record input (negative cost, empty phone number, ...).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MotorcareError {
    /// Whether this error should abort an entire scheduler run rather than
    /// being logged per record. Credential problems fail every send the
    /// same way, so retrying the rest of the batch is pointless.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::AuthFailed(_))
    }
}
