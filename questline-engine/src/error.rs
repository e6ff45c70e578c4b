//! Error taxonomy shared by every engine operation.
use thiserror::Error;

use crate::integrity::IntegrityReport;

/// Errors surfaced by engine operations.
///
/// Every operation either fully succeeds and persists, or fails with one of
/// these variants and leaves the on-disk document exactly as it was.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural validation of the candidate document failed before write.
    #[error("document validation failed: {0}")]
    Validation(String),

    /// The diff-based integrity guard rejected the save.
    #[error("integrity check rejected save: {0}")]
    IntegrityViolation(IntegrityReport),

    /// The persist step failed; the prior document was restored from backup
    /// when one was available.
    #[error("write to disk failed (restored from backup: {restored})")]
    WriteFailure {
        restored: bool,
        #[source]
        source: std::io::Error,
    },

    /// An operation referenced an item or task that does not exist.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// The backpack or a credit balance is below what the operation needs.
    #[error("insufficient {resource}: need {needed}, have {available}")]
    InsufficientResource {
        resource: String,
        needed: f64,
        available: f64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Convenience constructor for unknown-item errors.
    #[must_use]
    pub fn item_not_found(name: &str) -> Self {
        Self::NotFound {
            kind: "item",
            name: name.to_string(),
        }
    }

    /// Convenience constructor for unknown-task errors.
    #[must_use]
    pub fn task_not_found(id: u64) -> Self {
        Self::NotFound {
            kind: "task",
            name: id.to_string(),
        }
    }
}
