//! Violation Reconciler.
//!
//! Turns the candidate set for one point and the violations already stored
//! for that point into the smallest plan that makes storage equal the
//! candidates. Matching is by rule: a rule that still fires keeps its record
//! (and its reviewer workflow), refreshed in place if engine-owned fields
//! drifted.

use std::collections::HashMap;

use serde::Serialize;
use westgard_core::{ContextKey, PointId, RuleId, Violation, ViolationCandidate, ViolationId};

/// Writes needed to bring one point's violations in line with its candidates.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconcilePlan {
    /// Context of the point.
    pub context: ContextKey,
    /// The point.
    pub point_id: PointId,
    /// New records for rules that started firing.
    pub creates: Vec<Violation>,
    /// Existing records whose engine-owned fields changed.
    pub updates: Vec<Violation>,
    /// Records for rules that stopped firing.
    pub deletes: Vec<ViolationId>,
    /// Existing records left as they are.
    pub unchanged: Vec<ViolationId>,
}

impl ReconcilePlan {
    /// Whether applying the plan would write nothing.
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Counts for reporting.
    pub fn summary(&self, fired: Vec<String>) -> ReconcileSummary {
        ReconcileSummary {
            fired,
            created: self.creates.len(),
            updated: self.updates.len(),
            deleted: self.deletes.len(),
            unchanged: self.unchanged.len(),
        }
    }
}

/// What a reconciliation did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileSummary {
    /// Codes of the rules that fired, in rule-ID order.
    pub fired: Vec<String>,
    /// Records created.
    pub created: usize,
    /// Records refreshed.
    pub updated: usize,
    /// Records deleted.
    pub deleted: usize,
    /// Records untouched.
    pub unchanged: usize,
}

/// Diff candidates against existing violations for one point.
///
/// Existing records of other points are ignored. If storage holds more than
/// one record for the same rule, the oldest is kept and the rest deleted.
pub fn reconcile(
    context: &ContextKey,
    point_id: &PointId,
    candidates: Vec<ViolationCandidate>,
    existing: Vec<Violation>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan {
        context: context.clone(),
        point_id: point_id.clone(),
        creates: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
        unchanged: Vec::new(),
    };

    let mut existing: Vec<Violation> = existing
        .into_iter()
        .filter(|v| &v.point_id == point_id && &v.context == context)
        .collect();
    // Unparseable stamps sort first; IDs are v7 and break ties by creation.
    existing.sort_by(|a, b| {
        a.created_time()
            .cmp(&b.created_time())
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut by_rule: HashMap<RuleId, Violation> = HashMap::new();
    for violation in existing {
        if by_rule.contains_key(&violation.rule_id) {
            plan.deletes.push(violation.id);
        } else {
            let _ = by_rule.insert(violation.rule_id.clone(), violation);
        }
    }

    for candidate in candidates {
        match by_rule.remove(&candidate.rule_id) {
            Some(current) if current.matches_candidate(&candidate) => {
                plan.unchanged.push(current.id);
            }
            Some(mut current) => {
                current.refresh_from(&candidate);
                plan.updates.push(current);
            }
            None => plan.creates.push(Violation::from_candidate(candidate)),
        }
    }

    let mut stale: Vec<ViolationId> = by_rule.into_values().map(|v| v.id).collect();
    stale.sort();
    plan.deletes.extend(stale);
    plan
}
