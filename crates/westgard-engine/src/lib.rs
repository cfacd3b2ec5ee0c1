//! # westgard-engine
//!
//! Decides, after every write to a QC point, which Westgard rules the
//! trailing history of that point's context violates, and reconciles the
//! persisted violations for the point with that decision.
//!
//! Pipeline per point:
//! 1. [`window`]: fetch the trailing points of the context and score them
//! 2. [`evaluator`]: run every active, applicable rule against the window
//! 3. [`reconciler`]: diff the candidates against stored violations
//!
//! Collaborators (limits, points, rules, violation storage) are reached
//! through the traits in [`sources`]. Evaluations are serialized per context
//! by [`locks::ContextLocks`].

#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod locks;
pub mod memory;
pub mod reconciler;
pub mod ruleset;
pub mod sources;
pub mod window;

pub use engine::{
    EngineOptions, EvaluationEngine, EvaluationReport, Outcome, PointChange, ReplaySummary,
};
pub use error::{EvaluationWarning, SkipReason, SourceError};
pub use evaluator::{evaluate, evaluate_all, explain};
pub use memory::MemorySources;
pub use reconciler::{ReconcilePlan, ReconcileSummary, reconcile};
pub use ruleset::RuleSet;
pub use sources::{LimitSource, PointSource, RuleSource, ViolationStore};
pub use window::{EvaluationWindow, WindowBuilder, trailing_window};
