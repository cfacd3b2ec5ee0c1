//! Error and warning types for the evaluation engine.
//!
//! Nothing here aborts a write. Collaborator failures and bad configuration
//! surface as [`EvaluationWarning`]s on the report of the point that hit them.

use serde::Serialize;
use thiserror::Error;
use westgard_core::{ContextKey, LimitError, RuleConfigError};

/// Failure reported by a collaborator (limit lookup, point fetch, storage).
#[derive(Clone, Debug, Error)]
pub enum SourceError {
    /// The backing store failed.
    #[error("backend error: {0}")]
    Backend(String),

    /// A lookup that must succeed found nothing.
    #[error("not found: {0}")]
    NotFound(String),
}

/// A non-fatal problem met while evaluating one point or context.
#[derive(Clone, Debug, Error)]
pub enum EvaluationWarning {
    /// A rule record was invalid and skipped.
    #[error("rule skipped: {0}")]
    Configuration(#[from] RuleConfigError),

    /// No control limit exists for the context.
    #[error("no control limit for {context}")]
    MissingLimit {
        /// Context without a limit.
        context: ContextKey,
    },

    /// The control limit cannot normalize values.
    #[error("unusable control limit for {context}: {source}")]
    DegenerateLimit {
        /// Context with the bad limit.
        context: ContextKey,
        /// Why the limit is unusable.
        source: LimitError,
    },

    /// A collaborator call failed.
    #[error("{stage} failed for {context}: {source}")]
    Source {
        /// Context being evaluated.
        context: ContextKey,
        /// Pipeline stage that called the collaborator.
        stage: &'static str,
        /// Collaborator error.
        source: SourceError,
    },
}

impl EvaluationWarning {
    /// Short classification string for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::MissingLimit { .. } => "missing_limit",
            Self::DegenerateLimit { .. } => "degenerate_limit",
            Self::Source { .. } => "source_failure",
        }
    }

    /// The skip reason this warning implies, if it stops the whole pass.
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Configuration(_) => None,
            Self::MissingLimit { .. } => Some(SkipReason::MissingLimit),
            Self::DegenerateLimit { .. } => Some(SkipReason::DegenerateLimit),
            Self::Source { stage, .. } => Some(SkipReason::SourceFailure { stage }),
        }
    }
}

impl Serialize for EvaluationWarning {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("EvaluationWarning", 2)?;
        s.serialize_field("kind", self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}

/// Why no violations were computed for a point.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "camelCase")]
pub enum SkipReason {
    /// No control limit for the context.
    MissingLimit,
    /// The control limit has SD <= 0.
    DegenerateLimit,
    /// A collaborator call failed.
    SourceFailure {
        /// Pipeline stage that failed.
        stage: &'static str,
    },
}
