//! Rule configuration and validated rule definitions.
//!
//! Rules are administered as flat [`RuleConfig`] records (one row per rule,
//! several nullable fields). Before evaluation each record is validated into
//! a [`RuleDefinition`] whose [`RuleKind`] is exactly one of the three rule
//! shapes, so a wrong field combination can never reach the evaluator.
//!
//! The free-text `expression` is a display label only. It is carried through
//! unchanged and never interpreted.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::RuleConfigError;
use crate::ids::{QcLevelId, RuleId};
use crate::severity::Severity;

/// A rule as stored by the administrative surface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Short Westgard code, e.g. `2-2s`.
    pub code: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Display-only description of the rule logic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Points required, including the evaluation point.
    pub window_size: i64,
    /// Magnitude boundary in SD units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_sd: Option<f64>,
    /// All window points must share one side of the mean.
    #[serde(default)]
    pub same_side: bool,
    /// The two window points must straddle the mean.
    #[serde(default)]
    pub opposite_sides: bool,
    /// Distance boundary for opposite-side rules, in SD units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_abs_z_gt: Option<f64>,
    /// Severity of violations this rule produces.
    pub severity: Severity,
    /// Inactive rules are never evaluated.
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// QC levels the rule applies to. Empty means every level.
    #[serde(default)]
    pub applies_to: Vec<QcLevelId>,
}

fn default_active() -> bool {
    true
}

/// The closed set of rule shapes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RuleKind {
    /// `|z_last| > threshold_sd`.
    #[serde(rename_all = "camelCase")]
    SinglePoint {
        /// Magnitude boundary.
        threshold_sd: f64,
    },
    /// The trailing `points` share one non-zero side, each with `|z| > threshold_sd`.
    #[serde(rename_all = "camelCase")]
    SameSideConsecutive {
        /// Streak length.
        points: usize,
        /// Magnitude boundary; `0.0` means side alone decides.
        threshold_sd: f64,
    },
    /// The trailing two points straddle the mean and `|z1 - z2| > sum_abs_z_gt`.
    #[serde(rename_all = "camelCase")]
    OppositeSidePair {
        /// Distance boundary.
        sum_abs_z_gt: f64,
    },
}

impl RuleKind {
    /// Points the rule needs before it can fire.
    pub fn window_size(&self) -> usize {
        match self {
            Self::SinglePoint { .. } => 1,
            Self::SameSideConsecutive { points, .. } => *points,
            Self::OppositeSidePair { .. } => 2,
        }
    }

    /// Short shape label used in logs and errors.
    pub fn shape(&self) -> &'static str {
        match self {
            Self::SinglePoint { .. } => SINGLE_POINT,
            Self::SameSideConsecutive { .. } => SAME_SIDE,
            Self::OppositeSidePair { .. } => OPPOSITE_PAIR,
        }
    }
}

const SINGLE_POINT: &str = "single-point";
const SAME_SIDE: &str = "same-side consecutive";
const OPPOSITE_PAIR: &str = "opposite-side pair";

/// A validated rule, ready for evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Short Westgard code.
    pub code: String,
    /// Human-readable name.
    pub name: String,
    /// Display-only label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    /// Shape and thresholds.
    pub kind: RuleKind,
    /// Severity of violations this rule produces.
    pub severity: Severity,
    /// QC levels the rule applies to. Empty means every level.
    pub applies_to: BTreeSet<QcLevelId>,
}

impl RuleDefinition {
    /// Validate a configuration record.
    ///
    /// Activity is not checked here; callers filter inactive records first.
    pub fn try_from_config(config: &RuleConfig) -> Result<Self, RuleConfigError> {
        let rule_id = &config.id;

        if config.window_size < 1 {
            return Err(RuleConfigError::InvalidWindow {
                rule_id: rule_id.clone(),
                window_size: config.window_size,
            });
        }
        if config.same_side && config.opposite_sides {
            return Err(RuleConfigError::ConflictingShape {
                rule_id: rule_id.clone(),
            });
        }

        let kind = if config.opposite_sides {
            expect_window(config, OPPOSITE_PAIR, 2)?;
            let sum_abs_z_gt =
                required_threshold(rule_id, config.sum_abs_z_gt, "sumAbsZGt", OPPOSITE_PAIR)?;
            RuleKind::OppositeSidePair { sum_abs_z_gt }
        } else if config.same_side {
            let threshold_sd =
                required_threshold(rule_id, config.threshold_sd, "thresholdSd", SAME_SIDE)?;
            RuleKind::SameSideConsecutive {
                points: usize::try_from(config.window_size).unwrap_or(usize::MAX),
                threshold_sd,
            }
        } else {
            expect_window(config, SINGLE_POINT, 1)?;
            let threshold_sd =
                required_threshold(rule_id, config.threshold_sd, "thresholdSd", SINGLE_POINT)?;
            RuleKind::SinglePoint { threshold_sd }
        };

        Ok(Self {
            id: config.id.clone(),
            code: config.code.clone(),
            name: config.name.clone(),
            expression: config.expression.clone(),
            kind,
            severity: config.severity,
            applies_to: config.applies_to.iter().cloned().collect(),
        })
    }

    /// Whether this rule is configured for the given QC level.
    pub fn applies_to_level(&self, level: &QcLevelId) -> bool {
        self.applies_to.is_empty() || self.applies_to.contains(level)
    }

    /// Points the rule needs before it can fire.
    pub fn window_size(&self) -> usize {
        self.kind.window_size()
    }
}

fn expect_window(
    config: &RuleConfig,
    shape: &'static str,
    expected: usize,
) -> Result<(), RuleConfigError> {
    if usize::try_from(config.window_size).ok() == Some(expected) {
        Ok(())
    } else {
        Err(RuleConfigError::WindowMismatch {
            rule_id: config.id.clone(),
            shape,
            expected,
            window_size: config.window_size,
        })
    }
}

fn required_threshold(
    rule_id: &RuleId,
    value: Option<f64>,
    field: &'static str,
    shape: &'static str,
) -> Result<f64, RuleConfigError> {
    let Some(value) = value else {
        return Err(RuleConfigError::MissingThreshold {
            rule_id: rule_id.clone(),
            field,
            shape,
        });
    };
    if !value.is_finite() || value < 0.0 {
        return Err(RuleConfigError::InvalidThreshold {
            rule_id: rule_id.clone(),
            field,
            value,
        });
    }
    Ok(value)
}
