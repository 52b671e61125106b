//! Error types for the simulator.

use thiserror::Error;

/// Errors raised while configuring or stepping a simulation.
#[derive(Error, Debug)]
pub enum SimError {
    /// A configuration value is out of its allowed domain.
    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig {
        field: &'static str,
        reason: String,
    },

    /// An arrival source produced a gap that would stall or rewind the clock.
    #[error("arrival source produced a non-positive inter-arrival gap: {gap}")]
    InvalidGap { gap: f64 },

    /// An arrival source produced a priority outside the configured range.
    #[error("priority {priority} is outside the configured range {min}..={max}")]
    PriorityOutOfRange { priority: u8, min: u8, max: u8 },

    /// A finite arrival source ran dry before any termination bound was reached.
    #[error("arrival source exhausted before the simulation finished")]
    ScriptExhausted,

    /// A replication task panicked or was cancelled.
    #[error("replication task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Result type for simulator operations.
pub type Result<T> = std::result::Result<T, SimError>;
