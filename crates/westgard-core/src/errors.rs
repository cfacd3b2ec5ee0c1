//! Error types for rule configuration and limit lookup.

use thiserror::Error;

use crate::ids::RuleId;

/// A rule configuration record that cannot be turned into a rule.
///
/// Invalid rules are skipped by the evaluator, never fatal to a pass.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum RuleConfigError {
    /// `window_size` was below 1.
    #[error("rule {rule_id}: window size {window_size} is below 1")]
    InvalidWindow {
        /// The offending rule.
        rule_id: RuleId,
        /// Configured window size.
        window_size: i64,
    },

    /// Both `same_side` and `opposite_sides` were set.
    #[error("rule {rule_id}: same-side and opposite-sides flags are mutually exclusive")]
    ConflictingShape {
        /// The offending rule.
        rule_id: RuleId,
    },

    /// A threshold required by the rule's shape is absent.
    #[error("rule {rule_id}: missing {field} for {shape} rule")]
    MissingThreshold {
        /// The offending rule.
        rule_id: RuleId,
        /// Field that must be present.
        field: &'static str,
        /// Rule shape that requires it.
        shape: &'static str,
    },

    /// A threshold is negative or not a finite number.
    #[error("rule {rule_id}: {field} must be a finite non-negative number, got {value}")]
    InvalidThreshold {
        /// The offending rule.
        rule_id: RuleId,
        /// Field holding the bad value.
        field: &'static str,
        /// The bad value.
        value: f64,
    },

    /// Window size does not fit the rule's shape.
    #[error("rule {rule_id}: {shape} rule requires window size {expected}, got {window_size}")]
    WindowMismatch {
        /// The offending rule.
        rule_id: RuleId,
        /// Rule shape.
        shape: &'static str,
        /// Window size the shape requires.
        expected: usize,
        /// Configured window size.
        window_size: i64,
    },

    /// The stored record could not be read as a rule at all.
    #[error("rule {rule_id}: malformed record: {reason}")]
    Malformed {
        /// ID the record is stored under.
        rule_id: RuleId,
        /// Why the record was rejected.
        reason: String,
    },
}

/// A control limit that cannot normalize values.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum LimitError {
    /// SD is zero, negative, or either mean or SD is not finite.
    #[error("degenerate control limit (mean {mean}, sd {sd})")]
    DegenerateLimit {
        /// Limit mean.
        mean: f64,
        /// Limit standard deviation.
        sd: f64,
    },
}
