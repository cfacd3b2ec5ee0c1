//! Engine collaborator traits implemented over the repositories.

use westgard_core::{
    ContextKey, ControlLimit, PointId, PointKey, QcLevelId, QcPoint, RuleConfig, RuleConfigError,
    Violation,
};
use westgard_engine::{
    LimitSource, PointSource, ReconcilePlan, RuleSource, SourceError, ViolationStore,
};

use crate::database::Database;
use crate::limits::LimitRepo;
use crate::points::PointRepo;
use crate::rules::RuleRepo;
use crate::violations::ViolationRepo;

/// All four repositories over one database.
#[derive(Clone, Debug)]
pub struct SqliteSources {
    /// Control limits.
    pub limits: LimitRepo,
    /// QC points.
    pub points: PointRepo,
    /// Rule records.
    pub rules: RuleRepo,
    /// Violations.
    pub violations: ViolationRepo,
}

impl SqliteSources {
    /// Repositories sharing `db`.
    pub fn new(db: &Database) -> Self {
        Self {
            limits: LimitRepo::new(db.clone()),
            points: PointRepo::new(db.clone()),
            rules: RuleRepo::new(db.clone()),
            violations: ViolationRepo::new(db.clone()),
        }
    }
}

impl LimitSource for SqliteSources {
    fn limit(&self, context: &ContextKey) -> Result<Option<ControlLimit>, SourceError> {
        Ok(self.limits.get(context)?)
    }
}

impl PointSource for SqliteSources {
    fn trailing_points(
        &self,
        context: &ContextKey,
        at: &PointKey,
        limit: usize,
    ) -> Result<Vec<QcPoint>, SourceError> {
        Ok(self.points.trailing(context, at, limit)?)
    }

    fn context_points(&self, context: &ContextKey) -> Result<Vec<QcPoint>, SourceError> {
        Ok(self.points.for_context(context)?)
    }
}

impl RuleSource for SqliteSources {
    fn rules_for_level(
        &self,
        level: &QcLevelId,
    ) -> Result<Vec<Result<RuleConfig, RuleConfigError>>, SourceError> {
        Ok(self.rules.for_level(level)?)
    }
}

impl ViolationStore for SqliteSources {
    fn violations_at(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<Vec<Violation>, SourceError> {
        Ok(self.violations.at_point(context, point_id)?)
    }

    fn apply(&self, plan: &ReconcilePlan) -> Result<(), SourceError> {
        Ok(self.violations.apply(plan)?)
    }

    fn delete_for_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<usize, SourceError> {
        Ok(self.violations.delete_for_point(context, point_id)?)
    }
}
