//! Rule Evaluator.
//!
//! Applies one rule to one window. The evaluation point is the last element
//! of the window, and only it and its predecessors are ever consulted. Rules
//! are independent: every rule that fires yields its own candidate.

use tracing::debug;
use westgard_core::{RuleDefinition, RuleKind, ScoredPoint, Side, ViolationCandidate};

use crate::ruleset::RuleSet;
use crate::window::EvaluationWindow;

/// Evaluate one rule against a window.
///
/// Returns `None` when the rule does not fire, including when the window is
/// shorter than the rule needs.
pub fn evaluate(rule: &RuleDefinition, window: &EvaluationWindow) -> Option<ViolationCandidate> {
    let Some(trailing) = window.trailing(rule.window_size()) else {
        debug!(
            rule_id = %rule.id,
            needed = rule.window_size(),
            available = window.len(),
            "window too short"
        );
        return None;
    };

    let fired = match rule.kind {
        RuleKind::SinglePoint { threshold_sd } => {
            trailing.last().is_some_and(|p| p.z.abs() > threshold_sd)
        }
        RuleKind::SameSideConsecutive { threshold_sd, .. } => same_side_streak(trailing, threshold_sd),
        RuleKind::OppositeSidePair { sum_abs_z_gt } => match trailing {
            [first, second] => opposite_pair(first, second, sum_abs_z_gt),
            _ => false,
        },
    };

    let last = trailing.last()?;
    debug!(rule_id = %rule.id, code = %rule.code, point_id = %last.point.id, z = last.z, fired, "rule evaluated");
    if !fired {
        return None;
    }

    Some(ViolationCandidate {
        context: last.point.context.clone(),
        rule_id: rule.id.clone(),
        rule_code: rule.code.clone(),
        point_id: last.point.id.clone(),
        entry_date: last.point.entry_date,
        severity: rule.severity,
        explanation: explain(&rule.kind),
        z_score: last.z,
    })
}

/// Evaluate every rule of a snapshot. Candidates come back in rule-ID order.
pub fn evaluate_all(rules: &RuleSet, window: &EvaluationWindow) -> Vec<ViolationCandidate> {
    rules
        .rules()
        .iter()
        .filter_map(|rule| evaluate(rule, window))
        .collect()
}

/// Human-readable explanation of what a rule detected.
///
/// Depends only on the rule, so re-evaluating an unchanged breach yields the
/// same text.
pub fn explain(kind: &RuleKind) -> String {
    match kind {
        RuleKind::SinglePoint { threshold_sd } => {
            format!("1 point exceeded ±{threshold_sd}SD")
        }
        RuleKind::SameSideConsecutive {
            points,
            threshold_sd,
        } if *threshold_sd > 0.0 => {
            format!("{points} consecutive points exceeded ±{threshold_sd}SD on the same side")
        }
        RuleKind::SameSideConsecutive { points, .. } => {
            format!("{points} consecutive points fell on the same side of the mean")
        }
        RuleKind::OppositeSidePair { sum_abs_z_gt } => {
            format!("2 consecutive points on opposite sides of the mean differ by more than {sum_abs_z_gt}SD")
        }
    }
}

/// Every point on one non-zero side, each beyond `threshold_sd`.
fn same_side_streak(points: &[ScoredPoint], threshold_sd: f64) -> bool {
    let Some(first) = points.first() else {
        return false;
    };
    let side = first.side();
    side != Side::None
        && points
            .iter()
            .all(|p| p.side() == side && p.z.abs() > threshold_sd)
}

/// Non-zero opposite sides and a spread beyond `sum_abs_z_gt`.
fn opposite_pair(first: &ScoredPoint, second: &ScoredPoint, sum_abs_z_gt: f64) -> bool {
    let (a, b) = (first.side(), second.side());
    a != Side::None && b != Side::None && a != b && (first.z - second.z).abs() > sum_abs_z_gt
}
