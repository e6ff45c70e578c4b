//! Diff-based integrity guard applied before every persisted write.
//!
//! This is a coarse anti-corruption check, not a semantic diff: it compares
//! entry counts of the two high-churn document fields and rejects writes
//! whose blast radius exceeds the configured thresholds, which catches bulk
//! accidental truncation while tolerating normal incremental edits.
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::EngineError;
use crate::state::Document;

/// The fields the guard watches: the item catalog and the task list.
const GUARDED_FIELDS: [&str; 2] = ["items", "tasks"];

/// Thresholds for the integrity comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrityConfig {
    /// How many guarded fields may differ at all between saves.
    pub max_different_fields: usize,
    /// Largest allowed per-field entry-count delta.
    pub max_items_per_field: usize,
    /// Whether the per-field delta cap is enforced.
    pub single_field_check: bool,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            max_different_fields: 2,
            max_items_per_field: 10,
            single_field_check: true,
        }
    }
}

/// Entry-count comparison for one guarded field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDelta {
    pub original: usize,
    pub candidate: usize,
}

impl FieldDelta {
    /// Absolute entry-count difference.
    #[must_use]
    pub const fn delta(self) -> usize {
        self.original.abs_diff(self.candidate)
    }
}

/// Detailed result of an integrity comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub fields: BTreeMap<&'static str, FieldDelta>,
    pub different_fields: usize,
    pub over_threshold_fields: usize,
    pub config: IntegrityConfig,
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} field(s) differ (max {}), {} over per-field cap of {}",
            self.different_fields,
            self.config.max_different_fields,
            self.over_threshold_fields,
            self.config.max_items_per_field
        )?;
        for (field, delta) in &self.fields {
            if delta.delta() > 0 {
                write!(
                    f,
                    "; {field}: {} -> {}",
                    delta.original, delta.candidate
                )?;
            }
        }
        Ok(())
    }
}

impl IntegrityReport {
    /// Whether the candidate passes the thresholds in `config`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.different_fields <= self.config.max_different_fields
            && self.over_threshold_fields == 0
    }
}

/// Compare the guarded field counts of `original` and `candidate`.
#[must_use]
pub fn compare(
    original: &Document,
    candidate: &Document,
    config: IntegrityConfig,
) -> IntegrityReport {
    let mut fields = BTreeMap::new();
    fields.insert(
        GUARDED_FIELDS[0],
        FieldDelta {
            original: original.items.len(),
            candidate: candidate.items.len(),
        },
    );
    fields.insert(
        GUARDED_FIELDS[1],
        FieldDelta {
            original: original.tasks.len(),
            candidate: candidate.tasks.len(),
        },
    );

    let different_fields = fields.values().filter(|d| d.delta() > 0).count();
    let over_threshold_fields = if config.single_field_check {
        fields
            .values()
            .filter(|d| d.delta() > config.max_items_per_field)
            .count()
    } else {
        0
    };

    IntegrityReport {
        fields,
        different_fields,
        over_threshold_fields,
        config,
    }
}

/// Run the guard, rejecting candidates over threshold.
///
/// # Errors
///
/// `IntegrityViolation` carrying the full report when thresholds are
/// exceeded.
pub fn check(
    original: &Document,
    candidate: &Document,
    config: IntegrityConfig,
) -> Result<IntegrityReport, EngineError> {
    let report = compare(original, candidate, config);
    if report.is_ok() {
        Ok(report)
    } else {
        Err(EngineError::IntegrityViolation(report))
    }
}

/// Fail fast when the serialized candidate is missing a required top-level
/// field or stores one as the wrong container kind.
///
/// # Errors
///
/// `Validation` describing the first violated field.
pub fn validate_structure(candidate: &Value) -> Result<(), EngineError> {
    let root = candidate
        .as_object()
        .ok_or_else(|| EngineError::Validation("document root must be an object".to_string()))?;

    for field in ["stats", "properties", "credits", "items", "backpack", "tasks"] {
        let value = root
            .get(field)
            .ok_or_else(|| EngineError::Validation(format!("missing required field: {field}")))?;
        let ok = match field {
            "tasks" => value.is_array(),
            _ => value.is_object(),
        };
        if !ok {
            let expected = if field == "tasks" { "array" } else { "object" };
            return Err(EngineError::Validation(format!(
                "field {field} must be an {expected}"
            )));
        }
    }
    Ok(())
}
