//! Window Builder and z-score normalization.
//!
//! A window is the chronologically ordered tail of one context's points,
//! ending at and including the point under evaluation. The evaluation point
//! always enters the window with its current value and entry date, whatever
//! the collaborator still has stored for it.

use westgard_core::{ControlLimit, LimitError, QcPoint, ScoredPoint};

use crate::error::SourceError;
use crate::sources::PointSource;

/// Trailing window of `point` drawn from `candidates`.
///
/// Keeps candidates of the same context strictly before `point` in
/// `(entry_date, id)` order, drops any stored copy of `point` itself, appends
/// `point`, and returns the last `size` entries in ascending order.
pub fn trailing_window(point: &QcPoint, candidates: Vec<QcPoint>, size: usize) -> Vec<QcPoint> {
    if size == 0 {
        return Vec::new();
    }
    let key = point.key();
    let mut points: Vec<QcPoint> = candidates
        .into_iter()
        .filter(|p| p.id != point.id && p.context == point.context && p.key() < key)
        .collect();
    points.push(point.clone());
    points.sort_by_key(QcPoint::key);

    let start = points.len().saturating_sub(size);
    points.split_off(start)
}

/// Fetches trailing windows from a [`PointSource`].
pub struct WindowBuilder<'a> {
    points: &'a dyn PointSource,
}

impl<'a> WindowBuilder<'a> {
    /// Builder reading from `points`.
    pub fn new(points: &'a dyn PointSource) -> Self {
        Self { points }
    }

    /// The last `size` points of `point`'s context, ending at `point`.
    ///
    /// Returns fewer than `size` points when the context is shorter.
    pub fn build(&self, point: &QcPoint, size: usize) -> Result<Vec<QcPoint>, SourceError> {
        if size == 0 {
            return Ok(Vec::new());
        }
        // One extra: the stored copy of an edited point may sit inside the
        // fetched range and gets replaced by the current version.
        let fetched = self
            .points
            .trailing_points(&point.context, &point.key(), size + 1)?;
        Ok(trailing_window(point, fetched, size))
    }
}

/// Window points annotated with z-scores, last element = evaluation point.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EvaluationWindow {
    points: Vec<ScoredPoint>,
}

impl EvaluationWindow {
    /// Score ordered points under `limit`.
    pub fn score(points: Vec<QcPoint>, limit: &ControlLimit) -> Result<Self, LimitError> {
        limit.validate()?;
        let points = points
            .into_iter()
            .map(|point| {
                let z = (point.value - limit.mean) / limit.sd;
                ScoredPoint { point, z }
            })
            .collect();
        Ok(Self { points })
    }

    /// Wrap already-scored points, oldest first.
    pub fn from_scored(points: Vec<ScoredPoint>) -> Self {
        Self { points }
    }

    /// The evaluation point.
    pub fn last(&self) -> Option<&ScoredPoint> {
        self.points.last()
    }

    /// The trailing `n` points, or `None` when the window is shorter.
    pub fn trailing(&self, n: usize) -> Option<&[ScoredPoint]> {
        if n == 0 || n > self.points.len() {
            return None;
        }
        Some(&self.points[self.points.len() - n..])
    }

    /// All points, oldest first.
    pub fn points(&self) -> &[ScoredPoint] {
        &self.points
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the window holds no points.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
