//! Per-call snapshot of the rules that apply to one QC level.

use tracing::{debug, warn};
use westgard_core::{QcLevelId, RuleConfig, RuleConfigError, RuleDefinition};

/// Active, valid rules applicable to one QC level, sorted by rule ID.
///
/// Built fresh for every evaluation from the records the rule collaborator
/// returns, so concurrent evaluations never share mutable rule state.
#[derive(Clone, Debug, Default)]
pub struct RuleSet {
    rules: Vec<RuleDefinition>,
}

impl RuleSet {
    /// Validate and filter rule records for `level`.
    ///
    /// Inactive records and records scoped to other levels are dropped
    /// silently. Invalid records are dropped and returned as errors.
    pub fn for_level(configs: &[RuleConfig], level: &QcLevelId) -> (Self, Vec<RuleConfigError>) {
        let mut rules = Vec::new();
        let mut errors = Vec::new();

        for config in configs.iter().filter(|c| c.is_active) {
            match RuleDefinition::try_from_config(config) {
                Ok(rule) if rule.applies_to_level(level) => rules.push(rule),
                Ok(rule) => {
                    debug!(rule_id = %rule.id, level = %level, "rule not configured for level");
                }
                Err(e) => {
                    warn!(rule_id = %config.id, code = %config.code, error = %e, "invalid rule skipped");
                    errors.push(e);
                }
            }
        }

        rules.sort_by(|a, b| a.id.cmp(&b.id));
        (Self { rules }, errors)
    }

    /// Like [`RuleSet::for_level`], over records as a [`crate::RuleSource`]
    /// returns them. Unreadable records join the returned errors.
    pub fn from_records(
        records: Vec<Result<RuleConfig, RuleConfigError>>,
        level: &QcLevelId,
    ) -> (Self, Vec<RuleConfigError>) {
        let mut configs = Vec::with_capacity(records.len());
        let mut malformed = Vec::new();
        for record in records {
            match record {
                Ok(config) => configs.push(config),
                Err(e) => {
                    warn!(error = %e, "unreadable rule skipped");
                    malformed.push(e);
                }
            }
        }
        let (set, mut errors) = Self::for_level(&configs, level);
        malformed.append(&mut errors);
        (set, malformed)
    }

    /// Build from already-validated definitions.
    pub fn from_definitions(mut rules: Vec<RuleDefinition>) -> Self {
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        Self { rules }
    }

    /// Largest window any rule needs; `0` when there are no rules.
    pub fn max_window(&self) -> usize {
        self.rules
            .iter()
            .map(RuleDefinition::window_size)
            .max()
            .unwrap_or(0)
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[RuleDefinition] {
        &self.rules
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rule applies.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
