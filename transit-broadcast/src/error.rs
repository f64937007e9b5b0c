//! Failure taxonomy for the broadcast pipeline. All failures are values; nothing
//! in this crate terminates the process.

use thiserror::Error;

/// Errors surfaced by the broadcast engine.
///
/// `Validation` and `StateConflict` are rejected at the boundary and mutate no
/// state. `Delivery` is always recoverable through the queue. `Exhausted` is
/// the single designed data-loss path and is always accompanied by a drop
/// metric. `Store` surfaces durable-store unavailability without masking it.
#[derive(Debug, Error)]
pub enum BroadcastError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("delivery to client '{client_id}' failed: {reason}")]
    Delivery { client_id: String, reason: String },

    #[error("delivery to client '{client_id}' exhausted after {retries} retries")]
    Exhausted { client_id: String, retries: u8 },

    #[error("durable store operation failed: {0}")]
    Store(String),
}

impl BroadcastError {
    /// Returns `true` for failures that leave the pipeline healthy.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BroadcastError::Exhausted { .. })
    }
}
