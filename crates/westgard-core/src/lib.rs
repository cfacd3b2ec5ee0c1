//! # westgard-core
//!
//! Shared vocabulary for Westgard QC rule evaluation.
//!
//! - **Branded IDs**: `AnalyteId`, `LotId`, `QcLevelId`, `MachineId`, `PointId`,
//!   `RuleId`, `ViolationId` as newtypes for type safety
//! - **Context**: [`ContextKey`] scoping one control-limit series and the
//!   [`ControlLimit`] z-score normalizer
//! - **Points**: [`QcPoint`] measurements, their [`PointKey`] ordering, and
//!   z-annotated [`ScoredPoint`]s
//! - **Rules**: flat [`RuleConfig`] records validated into tagged
//!   [`RuleDefinition`]s
//! - **Violations**: persisted [`Violation`] records with reviewer workflow
//! - **Catalog**: the standard Westgard multi-rule set

#![deny(unsafe_code)]

pub mod catalog;
pub mod context;
pub mod errors;
pub mod ids;
pub mod point;
pub mod rules;
pub mod severity;
pub mod violation;

pub use catalog::{CATALOG_RULE_IDS, westgard_catalog};
pub use context::{ContextKey, ControlLimit};
pub use errors::{LimitError, RuleConfigError};
pub use ids::{AnalyteId, LotId, MachineId, PointId, QcLevelId, RuleId, ViolationId};
pub use point::{PointKey, QcPoint, ScoredPoint, Side};
pub use rules::{RuleConfig, RuleDefinition, RuleKind};
pub use severity::{Severity, max_severity};
pub use violation::{Violation, ViolationCandidate, ViolationStatus, ViolationWorkflow};
