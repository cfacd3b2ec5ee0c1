//! Violation records and candidates.
//!
//! A [`ViolationCandidate`] is what the evaluator produces for one rule at one
//! point. A [`Violation`] is the persisted record. Engine-owned fields are
//! refreshed on re-evaluation; the [`ViolationWorkflow`] belongs to human
//! reviewers and is never written by the engine after creation.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextKey;
use crate::ids::{PointId, RuleId, ViolationId};
use crate::severity::Severity;

/// Review state of a violation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationStatus {
    /// Awaiting review.
    #[default]
    Open,
    /// Seen by staff, corrective action pending.
    Acknowledged,
    /// Closed with a documented action.
    Resolved,
}

impl fmt::Display for ViolationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Acknowledged => write!(f, "acknowledged"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

impl FromStr for ViolationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown violation status: {other}")),
        }
    }
}

/// Reviewer-owned fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationWorkflow {
    /// Corrective action taken.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Staff member who handled the violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff: Option<String>,
    /// Review state.
    #[serde(default)]
    pub status: ViolationStatus,
}

/// One rule firing at one point, before persistence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationCandidate {
    /// Context of the triggering point.
    pub context: ContextKey,
    /// Rule that fired.
    pub rule_id: RuleId,
    /// Westgard code of the rule.
    pub rule_code: String,
    /// Triggering point.
    pub point_id: PointId,
    /// Entry date of the triggering point.
    pub entry_date: DateTime<Utc>,
    /// Severity configured on the rule.
    pub severity: Severity,
    /// Generated explanation.
    pub explanation: String,
    /// z-score of the triggering point.
    pub z_score: f64,
}

/// A persisted violation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    /// Record identity.
    pub id: ViolationId,
    /// Context of the triggering point.
    pub context: ContextKey,
    /// Rule that fired.
    pub rule_id: RuleId,
    /// Westgard code of the rule.
    pub rule_code: String,
    /// Triggering point.
    pub point_id: PointId,
    /// Entry date of the triggering point.
    pub entry_date: DateTime<Utc>,
    /// Severity configured on the rule.
    pub severity: Severity,
    /// Generated explanation.
    pub explanation: String,
    /// z-score of the triggering point.
    pub z_score: f64,
    /// Reviewer-owned fields.
    pub workflow: ViolationWorkflow,
    /// RFC 3339 creation time, UTC with nanoseconds.
    pub created_at: String,
    /// RFC 3339 time of the last engine refresh.
    pub updated_at: String,
}

impl Violation {
    /// Materialize a candidate as a new open violation.
    pub fn from_candidate(candidate: ViolationCandidate) -> Self {
        let now = timestamp_now();
        Self {
            id: ViolationId::new(),
            context: candidate.context,
            rule_id: candidate.rule_id,
            rule_code: candidate.rule_code,
            point_id: candidate.point_id,
            entry_date: candidate.entry_date,
            severity: candidate.severity,
            explanation: candidate.explanation,
            z_score: candidate.z_score,
            workflow: ViolationWorkflow::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Whether the engine-owned fields already equal the candidate's.
    pub fn matches_candidate(&self, candidate: &ViolationCandidate) -> bool {
        self.context == candidate.context
            && self.rule_id == candidate.rule_id
            && self.rule_code == candidate.rule_code
            && self.point_id == candidate.point_id
            && self.entry_date == candidate.entry_date
            && self.severity == candidate.severity
            && self.explanation == candidate.explanation
            && self.z_score.to_bits() == candidate.z_score.to_bits()
    }

    /// Copy engine-owned fields from a candidate, keeping identity and workflow.
    pub fn refresh_from(&mut self, candidate: &ViolationCandidate) {
        self.rule_code.clone_from(&candidate.rule_code);
        self.entry_date = candidate.entry_date;
        self.severity = candidate.severity;
        self.explanation.clone_from(&candidate.explanation);
        self.z_score = candidate.z_score;
        self.updated_at = timestamp_now();
    }

    /// Parsed creation time, or `None` if the stored text is not RFC 3339.
    pub fn created_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.created_at)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Fixed-width stamps, so text order is time order.
fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}
