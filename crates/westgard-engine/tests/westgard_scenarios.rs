//! End-to-end evaluation scenarios over in-memory collaborators.

#![allow(missing_docs, unused_results)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use westgard_core::{
    ContextKey, ControlLimit, PointId, QcPoint, Severity, Violation, ViolationStatus,
    ViolationWorkflow, max_severity, westgard_catalog,
};
use westgard_engine::{
    EngineOptions, EvaluationEngine, LimitSource, MemorySources, Outcome, PointChange,
    PointSource, ReconcilePlan, RuleSource, SkipReason, SourceError, ViolationStore,
};

const MEAN: f64 = 100.0;
const SD: f64 = 10.0;

fn ctx() -> ContextKey {
    ContextKey::new("glucose", "lot-2024-07", "L1", "cobas-1")
}

fn day(n: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap() + Duration::days(n)
}

fn value_for(z: f64) -> f64 {
    MEAN + z * SD
}

struct Lab {
    sources: Arc<MemorySources>,
    engine: EvaluationEngine,
    next_day: i64,
}

impl Lab {
    fn new() -> Self {
        let sources = Arc::new(MemorySources::with_rules(westgard_catalog()));
        sources.set_limit(ctx(), ControlLimit::new(MEAN, SD));
        let engine = EvaluationEngine::from_shared(sources.clone(), EngineOptions::default());
        Self {
            sources,
            engine,
            next_day: 0,
        }
    }

    /// Record a point at the next day with the given z-score.
    fn record(&mut self, z: f64) -> QcPoint {
        let point = QcPoint::new(ctx(), day(self.next_day), value_for(z));
        self.next_day += 1;
        self.sources.upsert_point(point.clone());
        let report = self.engine.on_point_written(PointChange::Created(point.clone()));
        assert_matches!(report.outcome, Outcome::Evaluated(_));
        point
    }

    fn record_all(&mut self, zs: &[f64]) -> Vec<QcPoint> {
        zs.iter().map(|z| self.record(*z)).collect()
    }

    fn edit(&self, point: &QcPoint, z: f64) -> QcPoint {
        let current = QcPoint {
            value: value_for(z),
            ..point.clone()
        };
        self.sources.upsert_point(current.clone());
        self.engine.on_point_written(PointChange::Updated {
            previous: point.clone(),
            current: current.clone(),
        });
        current
    }

    /// Move a point to a new entry date, keeping its value.
    fn move_to(&self, point: &QcPoint, at: DateTime<Utc>) -> QcPoint {
        let current = QcPoint {
            entry_date: at,
            ..point.clone()
        };
        self.sources.upsert_point(current.clone());
        let report = self.engine.on_point_written(PointChange::Updated {
            previous: point.clone(),
            current: current.clone(),
        });
        assert_matches!(report.outcome, Outcome::Evaluated(_));
        current
    }

    fn codes_at(&self, point: &QcPoint) -> Vec<String> {
        let mut codes: Vec<String> = self
            .sources
            .violations(&ctx())
            .into_iter()
            .filter(|v| v.point_id == point.id)
            .map(|v| v.rule_code)
            .collect();
        codes.sort();
        codes
    }

    fn all(&self) -> Vec<Violation> {
        self.sources.violations(&ctx())
    }
}

#[test]
fn one_3s_fires_at_z_3_5() {
    let mut lab = Lab::new();
    let p = lab.record(3.5);
    assert_eq!(lab.codes_at(&p), vec!["1-2s", "1-3s"]);
}

#[test]
fn z_2_5_fires_only_1_2s() {
    let mut lab = Lab::new();
    let p = lab.record(2.5);
    assert_eq!(lab.codes_at(&p), vec!["1-2s"]);
}

#[test]
fn two_2s_same_side_fires() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, 2.2]);
    assert!(lab.codes_at(&points[1]).contains(&"2-2s".to_string()));
}

#[test]
fn two_2s_opposite_sides_does_not_fire() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, -2.2]);
    let codes = lab.codes_at(&points[1]);
    assert!(!codes.contains(&"2-2s".to_string()));
    assert!(codes.contains(&"R-4s".to_string()));
}

#[test]
fn r_4s_fires_over_4sd_spread() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, -2.1]);
    assert!(lab.codes_at(&points[1]).contains(&"R-4s".to_string()));
}

#[test]
fn r_4s_quiet_under_4sd_spread() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, -1.0]);
    assert!(lab.codes_at(&points[1]).is_empty());
}

#[test]
fn ten_x_fires_on_ten_positive() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[0.3, 0.1, 0.5, 1.2, 0.4, 0.2, 0.9, 0.6, 0.1, 0.7]);
    assert_eq!(lab.codes_at(&points[9]), vec!["10x"]);
    for earlier in &points[..9] {
        assert!(lab.codes_at(earlier).is_empty());
    }
}

#[test]
fn ten_x_reset_by_zero() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[0.3, 0.1, 0.5, 1.2, 0.4, 0.0, 0.9, 0.6, 0.1, 0.7]);
    assert!(lab.codes_at(&points[9]).is_empty());
}

#[test]
fn window_shortage_never_fires_4_1s() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[1.5, 1.6, 1.7]);
    for p in &points {
        assert!(!lab.codes_at(p).contains(&"4-1s".to_string()));
    }

    let fourth = lab.record(1.8);
    assert_eq!(lab.codes_at(&fourth), vec!["4-1s"]);
}

#[test]
fn edit_removes_stale_1_2s_and_keeps_others() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[3.5, 0.5, 2.5]);
    let before_first = lab.codes_at(&points[0]);

    lab.edit(&points[2], 0.4);

    assert!(lab.codes_at(&points[2]).is_empty());
    assert_eq!(lab.codes_at(&points[0]), before_first);
}

#[test]
fn moving_a_point_beside_a_2s_neighbour_fires_2_2s() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, 0.0, 2.4]);
    assert_eq!(lab.codes_at(&points[2]), vec!["1-2s"]);

    let moved = lab.move_to(&points[2], day(0) + Duration::hours(1));
    assert_eq!(lab.codes_at(&moved), vec!["1-2s", "2-2s"]);
    assert_eq!(lab.codes_at(&points[0]), vec!["1-2s"]);
    assert!(lab.codes_at(&points[1]).is_empty());
}

#[test]
fn stale_stored_copy_never_enters_moved_point_window() {
    let mut lab = Lab::new();
    let mut zs = vec![-0.5];
    zs.extend([0.5; 9]);
    let points = lab.record_all(&zs);
    assert!(lab.codes_at(&points[9]).is_empty());

    // The point source still holds the first point at day 0.
    let moved = QcPoint {
        entry_date: day(10),
        value: value_for(0.5),
        ..points[0].clone()
    };
    let report = lab.engine.on_point_written(PointChange::Updated {
        previous: points[0].clone(),
        current: moved,
    });
    assert_matches!(&report.outcome, Outcome::Evaluated(s) if s.fired == vec!["10x"]);
}

#[test]
fn repeat_evaluation_changes_nothing() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, 2.2]);
    let before = lab.all();

    let report = lab
        .engine
        .on_point_written(PointChange::Created(points[1].clone()));

    assert_matches!(report.outcome, Outcome::Evaluated(s) if s.created == 0 && s.deleted == 0 && s.updated == 0);
    assert_eq!(lab.all(), before);
}

#[test]
fn appending_points_leaves_earlier_violations_alone() {
    let mut lab = Lab::new();
    let first = lab.record(2.5);
    let before = lab.all();

    lab.record_all(&[2.3, -2.4, 3.6, 0.0, 1.1]);

    let after_first: Vec<Violation> = lab
        .all()
        .into_iter()
        .filter(|v| v.point_id == first.id)
        .collect();
    assert_eq!(after_first, before);
}

#[test]
fn backdated_point_sees_only_its_own_history() {
    let mut lab = Lab::new();
    lab.record_all(&[2.5, 2.6, 2.7]);

    // Earlier than everything already recorded: no predecessors.
    let backdated = QcPoint::new(ctx(), day(-5), value_for(2.4));
    lab.sources.upsert_point(backdated.clone());
    lab.engine
        .on_point_written(PointChange::Created(backdated.clone()));

    assert_eq!(lab.codes_at(&backdated), vec!["1-2s"]);
}

#[test]
fn max_severity_over_point_violations() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[3.2, 3.5]);
    let severities = lab
        .all()
        .into_iter()
        .filter(|v| v.point_id == points[1].id)
        .map(|v| v.severity);
    assert_eq!(max_severity(severities), Some(Severity::Critical));
}

#[test]
fn workflow_survives_re_evaluation() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[2.5, 2.2]);
    let violation = lab
        .all()
        .into_iter()
        .find(|v| v.point_id == points[1].id && v.rule_code == "2-2s")
        .unwrap();
    let workflow = ViolationWorkflow {
        action: Some("recalibrated".into()),
        staff: Some("mlee".into()),
        status: ViolationStatus::Acknowledged,
    };
    lab.sources
        .set_workflow(&violation.id, workflow.clone())
        .unwrap();

    // Still beyond 2SD after the edit, so 2-2s keeps firing.
    lab.edit(&points[1], 2.9);

    let after = lab
        .all()
        .into_iter()
        .find(|v| v.id == violation.id)
        .unwrap();
    assert_eq!(after.workflow, workflow);
    assert!((after.z_score - 2.9).abs() < 1e-9);
}

#[test]
fn missing_limit_computes_and_deletes_nothing() {
    let mut lab = Lab::new();
    let p = lab.record(3.5);
    lab.sources.remove_limit(&ctx());

    let current = QcPoint {
        value: MEAN,
        ..p.clone()
    };
    lab.sources.upsert_point(current.clone());
    let report = lab.engine.on_point_written(PointChange::Updated {
        previous: p.clone(),
        current,
    });

    assert_eq!(report.outcome, Outcome::Skipped(SkipReason::MissingLimit));
    assert_eq!(report.warnings[0].kind(), "missing_limit");
    assert_eq!(lab.codes_at(&p), vec!["1-2s", "1-3s"]);
}

#[test]
fn degenerate_limit_is_skipped() {
    let mut lab = Lab::new();
    lab.sources.set_limit(ctx(), ControlLimit::new(MEAN, 0.0));
    let point = QcPoint::new(ctx(), day(0), 500.0);
    lab.sources.upsert_point(point.clone());

    let report = lab.engine.on_point_written(PointChange::Created(point));
    assert_eq!(report.outcome, Outcome::Skipped(SkipReason::DegenerateLimit));
    assert!(lab.all().is_empty());
}

#[test]
fn deleting_a_point_retires_only_its_violations() {
    let mut lab = Lab::new();
    let points = lab.record_all(&[3.5, 2.5]);
    let _ = lab.sources.remove_point(&points[1].id);

    let report = lab
        .engine
        .on_point_written(PointChange::Deleted(points[1].clone()));

    assert_matches!(report.outcome, Outcome::Retired { deleted } if deleted > 0);
    assert!(lab.codes_at(&points[1]).is_empty());
    assert_eq!(lab.codes_at(&points[0]), vec!["1-2s", "1-3s"]);
}

#[test]
fn inactive_rules_never_fire() {
    let lab = Lab::new();
    let mut rules = westgard_catalog();
    for rule in &mut rules {
        rule.is_active = rule.code != "1-2s";
    }
    lab.sources.set_rules(rules);

    let point = QcPoint::new(ctx(), day(0), value_for(2.5));
    lab.sources.upsert_point(point.clone());
    lab.engine.on_point_written(PointChange::Created(point.clone()));
    assert!(lab.codes_at(&point).is_empty());
}

#[test]
fn replay_after_limit_change_matches_fresh_evaluation() {
    let mut lab = Lab::new();
    lab.record_all(&[1.0, 1.2, 0.8, 1.1]);
    assert!(lab.all().is_empty());

    // Tighter SD pushes most of the run beyond 2SD.
    lab.sources.set_limit(ctx(), ControlLimit::new(MEAN, 4.0));
    let summary = lab.engine.replay_context(&ctx());
    assert_eq!(summary.points, 4);
    assert_eq!(summary.evaluated, 4);
    assert!(summary.created > 0);

    let replayed: Vec<(PointId, String)> = lab
        .all()
        .into_iter()
        .map(|v| (v.point_id, v.rule_code))
        .collect();

    let fresh = Lab::new();
    fresh.sources.set_limit(ctx(), ControlLimit::new(MEAN, 4.0));
    for point in lab.sources.context_points(&ctx()).unwrap() {
        fresh.sources.upsert_point(point.clone());
        fresh.engine.on_point_written(PointChange::Created(point));
    }
    let expected: Vec<(PointId, String)> = fresh
        .all()
        .into_iter()
        .map(|v| (v.point_id, v.rule_code))
        .collect();

    assert_eq!(replayed, expected);

    let again = lab.engine.replay_context(&ctx());
    assert_eq!((again.created, again.updated, again.deleted), (0, 0, 0));
}

#[test]
fn replay_of_long_context_keeps_full_windows() {
    let mut lab = Lab::new();
    let mut zs = vec![-0.5];
    zs.extend([0.5; 12]);
    let points = lab.record_all(&zs);
    let ten_x: Vec<usize> = (0..points.len())
        .filter(|&i| lab.codes_at(&points[i]) == vec!["10x"])
        .collect();
    assert_eq!(ten_x, vec![10, 11, 12]);

    let summary = lab.engine.replay_context(&ctx());
    assert_eq!(summary.evaluated, 13);
    assert_eq!((summary.created, summary.updated, summary.deleted), (0, 0, 0));
    assert_eq!(lab.all().len(), 3);
}

/// Wraps [`MemorySources`] and records how many evaluations overlap.
struct OverlapTracker {
    inner: MemorySources,
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
}

impl LimitSource for OverlapTracker {
    fn limit(&self, context: &ContextKey) -> Result<Option<ControlLimit>, SourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        self.inner.limit(context)
    }
}

impl PointSource for OverlapTracker {
    fn trailing_points(
        &self,
        context: &ContextKey,
        at: &westgard_core::PointKey,
        limit: usize,
    ) -> Result<Vec<QcPoint>, SourceError> {
        std::thread::sleep(std::time::Duration::from_millis(1));
        self.inner.trailing_points(context, at, limit)
    }

    fn context_points(&self, context: &ContextKey) -> Result<Vec<QcPoint>, SourceError> {
        self.inner.context_points(context)
    }
}

impl RuleSource for OverlapTracker {
    fn rules_for_level(
        &self,
        level: &westgard_core::QcLevelId,
    ) -> Result<Vec<Result<westgard_core::RuleConfig, westgard_core::RuleConfigError>>, SourceError>
    {
        self.inner.rules_for_level(level)
    }
}

impl ViolationStore for OverlapTracker {
    fn violations_at(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<Vec<Violation>, SourceError> {
        self.inner.violations_at(context, point_id)
    }

    fn apply(&self, plan: &ReconcilePlan) -> Result<(), SourceError> {
        let result = self.inner.apply(plan);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn delete_for_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<usize, SourceError> {
        self.inner.delete_for_point(context, point_id)
    }
}

#[test]
fn same_context_evaluations_never_overlap() {
    let tracker = Arc::new(OverlapTracker {
        inner: MemorySources::with_rules(westgard_catalog()),
        in_flight: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    tracker.inner.set_limit(ctx(), ControlLimit::new(MEAN, SD));
    let engine = EvaluationEngine::from_shared(tracker.clone(), EngineOptions::default());

    // Every point fires 1-2s, so every evaluation reaches `apply`.
    let points: Vec<QcPoint> = (0..16)
        .map(|i| QcPoint::new(ctx(), day(i), value_for(2.5)))
        .collect();
    for p in &points {
        tracker.inner.upsert_point(p.clone());
    }

    std::thread::scope(|s| {
        for p in &points {
            let engine = &engine;
            s.spawn(move || engine.on_point_written(PointChange::Created(p.clone())));
        }
    });

    assert_eq!(tracker.max_seen.load(Ordering::SeqCst), 1);
    // 1-2s on all 16, 2-2s from the 2nd, 4-1s from the 4th, 10x from the 10th.
    assert_eq!(tracker.inner.violations(&ctx()).len(), 16 + 15 + 13 + 7);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn evaluation_is_idempotent(zs in prop::collection::vec(-4.0f64..4.0, 1..14)) {
        let mut lab = Lab::new();
        let points = lab.record_all(&zs);
        let before = lab.all();

        for p in &points {
            let report = lab.engine.on_point_written(PointChange::Created(p.clone()));
            let unchanged = matches!(
                report.outcome,
                Outcome::Evaluated(ref s) if s.created == 0 && s.updated == 0 && s.deleted == 0
            );
            prop_assert!(unchanged);
        }
        prop_assert_eq!(lab.all(), before);
    }

    #[test]
    fn appends_never_touch_earlier_points(
        prefix in prop::collection::vec(-4.0f64..4.0, 1..12),
        suffix in prop::collection::vec(-4.0f64..4.0, 1..12),
    ) {
        let mut lab = Lab::new();
        lab.record_all(&prefix);
        let before = lab.all();

        lab.record_all(&suffix);

        let earlier: Vec<Violation> = lab
            .all()
            .into_iter()
            .filter(|v| v.entry_date < day(i64::try_from(prefix.len()).unwrap()))
            .collect();
        prop_assert_eq!(earlier, before);
    }
}
