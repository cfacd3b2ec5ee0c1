//! Built-in Westgard multi-rule catalog.
//!
//! Shipped as plain [`RuleConfig`] records so it flows through the same
//! validation path as administrator-defined rules.
//!
//! | Code | Shape | Severity |
//! |---|---|---|
//! | `1-2s` | one point beyond ±2SD | warning |
//! | `1-3s` | one point beyond ±3SD | error |
//! | `2-2s` | two consecutive beyond 2SD, same side | error |
//! | `2-3s` | two consecutive beyond 3SD, same side | critical |
//! | `R-4s` | two consecutive straddling the mean, spread over 4SD | error |
//! | `4-1s` | four consecutive beyond 1SD, same side | error |
//! | `10x` | ten consecutive on the same side | error |

use crate::ids::RuleId;
use crate::rules::RuleConfig;
use crate::severity::Severity;

/// IDs of the built-in rules.
pub const CATALOG_RULE_IDS: &[&str] = &[
    "westgard.1-2s",
    "westgard.1-3s",
    "westgard.2-2s",
    "westgard.2-3s",
    "westgard.R-4s",
    "westgard.4-1s",
    "westgard.10x",
];

/// Build all catalog rules.
pub fn westgard_catalog() -> Vec<RuleConfig> {
    vec![
        single_point("1-2s", "1 point beyond 2SD", 2.0, Severity::Warning),
        single_point("1-3s", "1 point beyond 3SD", 3.0, Severity::Error),
        same_side("2-2s", "2 consecutive beyond 2SD", 2, 2.0, Severity::Error),
        same_side("2-3s", "2 consecutive beyond 3SD", 2, 3.0, Severity::Critical),
        range_4s(),
        same_side("4-1s", "4 consecutive beyond 1SD", 4, 1.0, Severity::Error),
        same_side("10x", "10 consecutive on one side", 10, 0.0, Severity::Error),
    ]
}

fn base(code: &str, name: &str, window_size: i64, severity: Severity) -> RuleConfig {
    RuleConfig {
        id: RuleId::from_raw(format!("westgard.{code}")),
        code: code.into(),
        name: name.into(),
        expression: None,
        window_size,
        threshold_sd: None,
        same_side: false,
        opposite_sides: false,
        sum_abs_z_gt: None,
        severity,
        is_active: true,
        applies_to: Vec::new(),
    }
}

fn single_point(code: &str, name: &str, threshold_sd: f64, severity: Severity) -> RuleConfig {
    RuleConfig {
        expression: Some(format!("abs(z) > {threshold_sd}")),
        threshold_sd: Some(threshold_sd),
        ..base(code, name, 1, severity)
    }
}

fn same_side(
    code: &str,
    name: &str,
    points: i64,
    threshold_sd: f64,
    severity: Severity,
) -> RuleConfig {
    RuleConfig {
        expression: Some(format!(
            "last {points}: same sign(z) and abs(z) > {threshold_sd}"
        )),
        threshold_sd: Some(threshold_sd),
        same_side: true,
        ..base(code, name, points, severity)
    }
}

fn range_4s() -> RuleConfig {
    RuleConfig {
        expression: Some("last 2: opposite sign(z) and abs(z1 - z2) > 4".into()),
        opposite_sides: true,
        sum_abs_z_gt: Some(4.0),
        ..base("R-4s", "Range of 2 consecutive over 4SD", 2, Severity::Error)
    }
}
