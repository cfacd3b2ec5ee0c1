//! Evaluation entrypoint.
//!
//! [`EvaluationEngine::on_point_written`] is called by the entry-management
//! collaborator after it has committed a point write. It never fails: every
//! problem is reported as a warning on the returned [`EvaluationReport`], and
//! the write itself stands regardless.
//!
//! Evaluation is trailing-only. A write re-evaluates the written point and
//! nothing else; earlier points never change as a consequence.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use westgard_core::{ContextKey, ControlLimit, PointId, QcPoint};

use crate::error::{EvaluationWarning, SkipReason, SourceError};
use crate::evaluator::evaluate_all;
use crate::locks::{ContextLocks, DEFAULT_PRUNE_THRESHOLD};
use crate::reconciler::{ReconcileSummary, reconcile};
use crate::ruleset::RuleSet;
use crate::sources::{LimitSource, PointSource, RuleSource, ViolationStore};
use crate::window::{EvaluationWindow, WindowBuilder, trailing_window};

/// Tunables for an [`EvaluationEngine`].
#[derive(Clone, Debug)]
pub struct EngineOptions {
    /// Tracked-context count above which idle lock entries are pruned.
    pub lock_prune_threshold: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            lock_prune_threshold: DEFAULT_PRUNE_THRESHOLD,
        }
    }
}

/// A committed write to a QC point.
#[derive(Clone, Debug)]
pub enum PointChange {
    /// A new point was recorded.
    Created(QcPoint),
    /// A point's value, date, or context changed.
    Updated {
        /// The point before the write.
        previous: QcPoint,
        /// The point after the write.
        current: QcPoint,
    },
    /// A point was removed.
    Deleted(QcPoint),
}

impl PointChange {
    /// The point as it stands after the write.
    pub fn point(&self) -> &QcPoint {
        match self {
            Self::Created(p) | Self::Deleted(p) => p,
            Self::Updated { current, .. } => current,
        }
    }
}

/// What happened to the point's violations.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum Outcome {
    /// Rules ran and storage was reconciled.
    Evaluated(ReconcileSummary),
    /// The point was deleted and its violations removed.
    Retired {
        /// Violations removed.
        deleted: usize,
    },
    /// No violations were computed or changed.
    Skipped(SkipReason),
}

/// Result of handling one point write.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
    /// Context the point belongs to after the write.
    pub context: ContextKey,
    /// The written point.
    pub point_id: PointId,
    /// What happened.
    pub outcome: Outcome,
    /// Violations removed from the point's previous context, if it moved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moved_from: Option<(ContextKey, usize)>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<EvaluationWarning>,
}

/// Result of re-evaluating a whole context.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    /// Points visited.
    pub points: usize,
    /// Points evaluated and reconciled.
    pub evaluated: usize,
    /// Records created.
    pub created: usize,
    /// Records refreshed.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Set when the context could not be evaluated at all.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,
    /// Non-fatal problems met along the way.
    pub warnings: Vec<EvaluationWarning>,
}

/// Limit and rule snapshot for one context, taken under its lock.
struct PassInputs {
    limit: ControlLimit,
    rules: RuleSet,
}

/// Runs the window → evaluate → reconcile pipeline for point writes.
pub struct EvaluationEngine {
    limits: Arc<dyn LimitSource>,
    points: Arc<dyn PointSource>,
    rules: Arc<dyn RuleSource>,
    violations: Arc<dyn ViolationStore>,
    locks: ContextLocks,
}

impl EvaluationEngine {
    /// Engine over separate collaborators.
    pub fn new(
        limits: Arc<dyn LimitSource>,
        points: Arc<dyn PointSource>,
        rules: Arc<dyn RuleSource>,
        violations: Arc<dyn ViolationStore>,
        options: EngineOptions,
    ) -> Self {
        debug!(lock_prune_threshold = options.lock_prune_threshold, "EvaluationEngine initialized");
        Self {
            limits,
            points,
            rules,
            violations,
            locks: ContextLocks::new(options.lock_prune_threshold),
        }
    }

    /// Engine over one value implementing every collaborator trait.
    pub fn from_shared<S>(sources: Arc<S>, options: EngineOptions) -> Self
    where
        S: LimitSource + PointSource + RuleSource + ViolationStore + 'static,
    {
        Self::new(
            sources.clone(),
            sources.clone(),
            sources.clone(),
            sources,
            options,
        )
    }

    /// Handle a committed point write.
    #[instrument(skip_all, fields(point_id = %change.point().id, context = %change.point().context))]
    pub fn on_point_written(&self, change: PointChange) -> EvaluationReport {
        let start = Instant::now();
        let report = match change {
            PointChange::Created(point) => self.evaluate_point(&point),
            PointChange::Updated { previous, current } => {
                let mut moved_warnings = Vec::new();
                let moved_from = if previous.context == current.context {
                    None
                } else {
                    let deleted = self.retire_locked(&previous, &mut moved_warnings);
                    Some((previous.context.clone(), deleted.unwrap_or(0)))
                };
                let mut report = self.evaluate_point(&current);
                report.moved_from = moved_from;
                moved_warnings.append(&mut report.warnings);
                report.warnings = moved_warnings;
                report
            }
            PointChange::Deleted(point) => self.retire_point(&point),
        };

        debug!(
            outcome = ?report.outcome,
            warnings = report.warnings.len(),
            duration_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "point write handled"
        );
        report
    }

    /// Re-evaluate every point of a context in chronological order.
    ///
    /// Use after the context's limit or rules change. Each point is evaluated
    /// against its own trailing window, so the result equals evaluating every
    /// point at the time it was written.
    #[instrument(skip(self), fields(context = %context))]
    pub fn replay_context(&self, context: &ContextKey) -> ReplaySummary {
        self.locks.with_context(context, || {
            let mut summary = ReplaySummary::default();

            let inputs = match self.pass_inputs(context, &mut summary.warnings) {
                Ok(inputs) => inputs,
                Err(reason) => {
                    summary.skipped = Some(reason);
                    return summary;
                }
            };

            let points = match self.points.context_points(context) {
                Ok(points) => points,
                Err(source) => {
                    let warning = source_warning(context, "point fetch", source);
                    summary.skipped = warning.skip_reason();
                    summary.warnings.push(warning);
                    return summary;
                }
            };
            summary.points = points.len();

            // `points` is in `(entry_date, id)` order, so a point's window
            // predecessors are the `size` entries right before it.
            let size = inputs.rules.max_window();
            for (i, point) in points.iter().enumerate() {
                let history = points[i.saturating_sub(size)..i].to_vec();
                let window = trailing_window(point, history, size);
                match self.reconcile_point(point, &inputs, window) {
                    Ok(result) => {
                        summary.evaluated += 1;
                        summary.created += result.created;
                        summary.updated += result.updated;
                        summary.deleted += result.deleted;
                    }
                    Err(warning) => summary.warnings.push(warning),
                }
            }

            info!(
                points = summary.points,
                created = summary.created,
                updated = summary.updated,
                deleted = summary.deleted,
                "context replayed"
            );
            summary
        })
    }

    fn evaluate_point(&self, point: &QcPoint) -> EvaluationReport {
        let context = &point.context;
        let mut warnings = Vec::new();

        let outcome = self.locks.with_context(context, || {
            let inputs = match self.pass_inputs(context, &mut warnings) {
                Ok(inputs) => inputs,
                Err(reason) => return Outcome::Skipped(reason),
            };

            let window = match WindowBuilder::new(self.points.as_ref())
                .build(point, inputs.rules.max_window())
            {
                Ok(window) => window,
                Err(source) => return skip(&mut warnings, source_warning(context, "point fetch", source)),
            };

            match self.reconcile_point(point, &inputs, window) {
                Ok(summary) => Outcome::Evaluated(summary),
                Err(warning) => skip(&mut warnings, warning),
            }
        });

        EvaluationReport {
            context: context.clone(),
            point_id: point.id.clone(),
            outcome,
            moved_from: None,
            warnings,
        }
    }

    fn retire_point(&self, point: &QcPoint) -> EvaluationReport {
        let mut warnings = Vec::new();
        let outcome = match self.retire_locked(point, &mut warnings) {
            Some(deleted) => Outcome::Retired { deleted },
            None => Outcome::Skipped(SkipReason::SourceFailure {
                stage: "violation delete",
            }),
        };
        EvaluationReport {
            context: point.context.clone(),
            point_id: point.id.clone(),
            outcome,
            moved_from: None,
            warnings,
        }
    }

    /// Delete all violations of a point under its context's lock.
    fn retire_locked(
        &self,
        point: &QcPoint,
        warnings: &mut Vec<EvaluationWarning>,
    ) -> Option<usize> {
        self.locks.with_context(&point.context, || {
            match self.violations.delete_for_point(&point.context, &point.id) {
                Ok(deleted) => {
                    info!(context = %point.context, point_id = %point.id, deleted, "point violations retired");
                    Some(deleted)
                }
                Err(source) => {
                    let warning = source_warning(&point.context, "violation delete", source);
                    warn!(error = %warning, "failed to retire point violations");
                    warnings.push(warning);
                    None
                }
            }
        })
    }

    /// Resolve the limit and rule snapshot for a context.
    fn pass_inputs(
        &self,
        context: &ContextKey,
        warnings: &mut Vec<EvaluationWarning>,
    ) -> Result<PassInputs, SkipReason> {
        let limit = match self.limits.limit(context) {
            Ok(Some(limit)) => limit,
            Ok(None) => {
                let warning = EvaluationWarning::MissingLimit {
                    context: context.clone(),
                };
                warn!(error = %warning, "evaluation skipped");
                warnings.push(warning);
                return Err(SkipReason::MissingLimit);
            }
            Err(source) => {
                return Err(skip_reason(warnings, source_warning(context, "limit lookup", source)));
            }
        };
        if let Err(source) = limit.validate() {
            let warning = EvaluationWarning::DegenerateLimit {
                context: context.clone(),
                source,
            };
            warn!(error = %warning, "evaluation skipped");
            warnings.push(warning);
            return Err(SkipReason::DegenerateLimit);
        }

        let records = match self.rules.rules_for_level(&context.level) {
            Ok(records) => records,
            Err(source) => {
                return Err(skip_reason(warnings, source_warning(context, "rule lookup", source)));
            }
        };
        let (rules, errors) = RuleSet::from_records(records, &context.level);
        warnings.extend(errors.into_iter().map(EvaluationWarning::from));

        Ok(PassInputs { limit, rules })
    }

    /// Score, evaluate, and reconcile one point whose window is already built.
    fn reconcile_point(
        &self,
        point: &QcPoint,
        inputs: &PassInputs,
        window: Vec<QcPoint>,
    ) -> Result<ReconcileSummary, EvaluationWarning> {
        let context = &point.context;
        let window = EvaluationWindow::score(window, &inputs.limit).map_err(|source| {
            EvaluationWarning::DegenerateLimit {
                context: context.clone(),
                source,
            }
        })?;
        let candidates = evaluate_all(&inputs.rules, &window);
        let fired: Vec<String> = candidates.iter().map(|c| c.rule_code.clone()).collect();

        let existing = self
            .violations
            .violations_at(context, &point.id)
            .map_err(|source| source_warning(context, "violation lookup", source))?;

        let plan = reconcile(context, &point.id, candidates, existing);
        if !plan.is_noop() {
            self.violations
                .apply(&plan)
                .map_err(|source| source_warning(context, "violation write", source))?;
        }

        let summary = plan.summary(fired);
        info!(
            context = %context,
            point_id = %point.id,
            window = window.len(),
            fired = ?summary.fired,
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "point reconciled"
        );
        Ok(summary)
    }
}

impl std::fmt::Debug for EvaluationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationEngine")
            .field("locks", &self.locks)
            .finish_non_exhaustive()
    }
}

fn source_warning(context: &ContextKey, stage: &'static str, source: SourceError) -> EvaluationWarning {
    EvaluationWarning::Source {
        context: context.clone(),
        stage,
        source,
    }
}

/// Record a pass-stopping warning and return its skip reason.
fn skip_reason(warnings: &mut Vec<EvaluationWarning>, warning: EvaluationWarning) -> SkipReason {
    warn!(error = %warning, "evaluation skipped");
    let reason = warning.skip_reason().unwrap_or(SkipReason::SourceFailure {
        stage: "evaluation",
    });
    warnings.push(warning);
    reason
}

fn skip(warnings: &mut Vec<EvaluationWarning>, warning: EvaluationWarning) -> Outcome {
    Outcome::Skipped(skip_reason(warnings, warning))
}
