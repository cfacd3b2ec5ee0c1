//! Collaborator traits.
//!
//! The engine owns none of its data. Limits, points, and rule records are read
//! through these traits and violations are written through [`ViolationStore`].
//! `westgard-store` implements all four over SQLite; [`crate::MemorySources`]
//! implements them in memory.

use westgard_core::{
    ContextKey, ControlLimit, PointId, PointKey, QcLevelId, QcPoint, RuleConfig, RuleConfigError,
    Violation,
};

use crate::error::SourceError;
use crate::reconciler::ReconcilePlan;

/// Read access to control limits.
pub trait LimitSource: Send + Sync {
    /// The limit for a context, or `None` when none is configured.
    fn limit(&self, context: &ContextKey) -> Result<Option<ControlLimit>, SourceError>;
}

/// Read access to recorded QC points.
pub trait PointSource: Send + Sync {
    /// Up to `limit` points of `context` whose key is at or before `at`,
    /// the most recent ones, in ascending `(entry_date, id)` order.
    fn trailing_points(
        &self,
        context: &ContextKey,
        at: &PointKey,
        limit: usize,
    ) -> Result<Vec<QcPoint>, SourceError>;

    /// Every point of `context` in ascending `(entry_date, id)` order.
    fn context_points(&self, context: &ContextKey) -> Result<Vec<QcPoint>, SourceError>;
}

/// Read access to administered rule records.
pub trait RuleSource: Send + Sync {
    /// Rule records configured for a QC level, one entry per record.
    ///
    /// May include inactive or invalid records; the engine filters them. A
    /// record that cannot be read at all is returned as
    /// [`RuleConfigError::Malformed`] in its slot, so one bad record never
    /// hides the others. The outer error is for the lookup itself failing.
    fn rules_for_level(
        &self,
        level: &QcLevelId,
    ) -> Result<Vec<Result<RuleConfig, RuleConfigError>>, SourceError>;
}

/// Persistence for violations.
pub trait ViolationStore: Send + Sync {
    /// Violations currently recorded for one point.
    fn violations_at(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<Vec<Violation>, SourceError>;

    /// Apply a reconciliation plan atomically.
    fn apply(&self, plan: &ReconcilePlan) -> Result<(), SourceError>;

    /// Delete every violation recorded for one point. Returns how many.
    fn delete_for_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<usize, SourceError>;
}
