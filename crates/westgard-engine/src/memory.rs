//! In-memory collaborators.
//!
//! Implements every trait in [`crate::sources`] over plain maps. Used by the
//! engine's tests and by embedders that keep QC data in process.

use std::collections::HashMap;

use parking_lot::RwLock;
use westgard_core::{
    ContextKey, ControlLimit, PointId, PointKey, QcLevelId, QcPoint, RuleConfig, RuleConfigError,
    Violation, ViolationId, ViolationWorkflow,
};

use crate::error::SourceError;
use crate::reconciler::ReconcilePlan;
use crate::sources::{LimitSource, PointSource, RuleSource, ViolationStore};

#[derive(Default)]
struct State {
    limits: HashMap<ContextKey, ControlLimit>,
    points: HashMap<PointId, QcPoint>,
    rules: Vec<RuleConfig>,
    violations: HashMap<ViolationId, Violation>,
}

/// Limits, points, rules, and violations held in memory.
#[derive(Default)]
pub struct MemorySources {
    state: RwLock<State>,
}

impl MemorySources {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with rule records.
    pub fn with_rules(rules: Vec<RuleConfig>) -> Self {
        let sources = Self::default();
        sources.set_rules(rules);
        sources
    }

    /// Replace every rule record.
    pub fn set_rules(&self, rules: Vec<RuleConfig>) {
        self.state.write().rules = rules;
    }

    /// Set or replace the limit for a context.
    pub fn set_limit(&self, context: ContextKey, limit: ControlLimit) {
        let _ = self.state.write().limits.insert(context, limit);
    }

    /// Remove the limit for a context.
    pub fn remove_limit(&self, context: &ContextKey) {
        let _ = self.state.write().limits.remove(context);
    }

    /// Insert or replace a point by ID. Returns the previous version.
    pub fn upsert_point(&self, point: QcPoint) -> Option<QcPoint> {
        self.state.write().points.insert(point.id.clone(), point)
    }

    /// Remove a point. Returns it if it existed.
    pub fn remove_point(&self, id: &PointId) -> Option<QcPoint> {
        self.state.write().points.remove(id)
    }

    /// A point by ID.
    pub fn point(&self, id: &PointId) -> Option<QcPoint> {
        self.state.read().points.get(id).cloned()
    }

    /// Violations of a context ordered by `(entry_date, point_id, rule_id)`.
    pub fn violations(&self, context: &ContextKey) -> Vec<Violation> {
        let state = self.state.read();
        let mut out: Vec<Violation> = state
            .violations
            .values()
            .filter(|v| &v.context == context)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (a.entry_date, &a.point_id, &a.rule_id).cmp(&(b.entry_date, &b.point_id, &b.rule_id))
        });
        out
    }

    /// Set reviewer fields on a violation.
    pub fn set_workflow(
        &self,
        id: &ViolationId,
        workflow: ViolationWorkflow,
    ) -> Result<(), SourceError> {
        let mut state = self.state.write();
        let violation = state
            .violations
            .get_mut(id)
            .ok_or_else(|| SourceError::NotFound(format!("violation {id}")))?;
        violation.workflow = workflow;
        Ok(())
    }
}

impl LimitSource for MemorySources {
    fn limit(&self, context: &ContextKey) -> Result<Option<ControlLimit>, SourceError> {
        Ok(self.state.read().limits.get(context).cloned())
    }
}

impl PointSource for MemorySources {
    fn trailing_points(
        &self,
        context: &ContextKey,
        at: &PointKey,
        limit: usize,
    ) -> Result<Vec<QcPoint>, SourceError> {
        let mut points: Vec<QcPoint> = self
            .state
            .read()
            .points
            .values()
            .filter(|p| &p.context == context && &p.key() <= at)
            .cloned()
            .collect();
        points.sort_by_key(QcPoint::key);
        let start = points.len().saturating_sub(limit);
        Ok(points.split_off(start))
    }

    fn context_points(&self, context: &ContextKey) -> Result<Vec<QcPoint>, SourceError> {
        let mut points: Vec<QcPoint> = self
            .state
            .read()
            .points
            .values()
            .filter(|p| &p.context == context)
            .cloned()
            .collect();
        points.sort_by_key(QcPoint::key);
        Ok(points)
    }
}

impl RuleSource for MemorySources {
    fn rules_for_level(
        &self,
        level: &QcLevelId,
    ) -> Result<Vec<Result<RuleConfig, RuleConfigError>>, SourceError> {
        Ok(self
            .state
            .read()
            .rules
            .iter()
            .filter(|r| r.applies_to.is_empty() || r.applies_to.contains(level))
            .cloned()
            .map(Ok)
            .collect())
    }
}

impl ViolationStore for MemorySources {
    fn violations_at(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<Vec<Violation>, SourceError> {
        Ok(self
            .state
            .read()
            .violations
            .values()
            .filter(|v| &v.context == context && &v.point_id == point_id)
            .cloned()
            .collect())
    }

    fn apply(&self, plan: &ReconcilePlan) -> Result<(), SourceError> {
        let mut state = self.state.write();
        for id in &plan.deletes {
            let _ = state.violations.remove(id);
        }
        for violation in plan.creates.iter().chain(&plan.updates) {
            let _ = state
                .violations
                .insert(violation.id.clone(), violation.clone());
        }
        Ok(())
    }

    fn delete_for_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<usize, SourceError> {
        let mut state = self.state.write();
        let before = state.violations.len();
        state
            .violations
            .retain(|_, v| !(&v.context == context && &v.point_id == point_id));
        Ok(before - state.violations.len())
    }
}
