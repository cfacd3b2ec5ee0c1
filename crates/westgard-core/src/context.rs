//! Evaluation context and control limits.
//!
//! A [`ContextKey`] names one independent control-limit series. Everything
//! the engine does (windowing, locking, reconciliation) is scoped to exactly
//! one context.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::LimitError;
use crate::ids::{AnalyteId, LotId, MachineId, QcLevelId};

/// The (analyte, reagent lot, QC level, instrument) tuple.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextKey {
    /// Analyte being measured.
    pub analyte: AnalyteId,
    /// Reagent lot.
    pub lot: LotId,
    /// QC material level.
    pub level: QcLevelId,
    /// Instrument.
    pub machine: MachineId,
}

impl ContextKey {
    /// Build a key from anything convertible into the four IDs.
    pub fn new(
        analyte: impl Into<AnalyteId>,
        lot: impl Into<LotId>,
        level: impl Into<QcLevelId>,
        machine: impl Into<MachineId>,
    ) -> Self {
        Self {
            analyte: analyte.into(),
            lot: lot.into(),
            level: level.into(),
            machine: machine.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.analyte, self.lot, self.level, self.machine
        )
    }
}

/// Mean and SD for one context, owned by an external collaborator.
///
/// CV and TEA are carried for display and never used in evaluation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlLimit {
    /// Target mean.
    pub mean: f64,
    /// Standard deviation.
    pub sd: f64,
    /// Coefficient of variation, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cv: Option<f64>,
    /// Total allowable error, percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tea: Option<f64>,
}

impl ControlLimit {
    /// Limit with no CV/TEA metadata.
    pub fn new(mean: f64, sd: f64) -> Self {
        Self {
            mean,
            sd,
            cv: None,
            tea: None,
        }
    }

    /// Whether this limit can normalize values at all.
    pub fn validate(&self) -> Result<(), LimitError> {
        if self.mean.is_finite() && self.sd.is_finite() && self.sd > 0.0 {
            Ok(())
        } else {
            Err(LimitError::DegenerateLimit {
                mean: self.mean,
                sd: self.sd,
            })
        }
    }

    /// `(value - mean) / sd`.
    pub fn z_score(&self, value: f64) -> Result<f64, LimitError> {
        self.validate()?;
        Ok((value - self.mean) / self.sd)
    }
}
