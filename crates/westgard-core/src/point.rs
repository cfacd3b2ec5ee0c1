//! QC measurements and their ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::ContextKey;
use crate::ids::PointId;

/// One QC measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QcPoint {
    /// Stable identity, also the same-timestamp tie-break.
    pub id: PointId,
    /// Context the measurement belongs to.
    pub context: ContextKey,
    /// Entry date.
    pub entry_date: DateTime<Utc>,
    /// Measured value.
    pub value: f64,
}

impl QcPoint {
    /// Create a point with a freshly generated ID.
    pub fn new(context: ContextKey, entry_date: DateTime<Utc>, value: f64) -> Self {
        Self {
            id: PointId::new(),
            context,
            entry_date,
            value,
        }
    }

    /// Chronological ordering key.
    pub fn key(&self) -> PointKey {
        PointKey {
            entry_date: self.entry_date,
            id: self.id.clone(),
        }
    }
}

/// `(entry_date, id)`: the total order of points within a context.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointKey {
    /// Primary sort: entry date.
    pub entry_date: DateTime<Utc>,
    /// Secondary sort: identity token.
    pub id: PointId,
}

/// Which side of the mean a z-score falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Above the mean.
    Positive,
    /// Below the mean.
    Negative,
    /// Exactly on the mean (or not a number). Breaks every streak.
    None,
}

impl Side {
    /// Side of a z-score. `0.0`, `-0.0` and `NaN` belong to neither side.
    pub fn of(z: f64) -> Self {
        match z.partial_cmp(&0.0) {
            Some(Ordering::Greater) => Self::Positive,
            Some(Ordering::Less) => Self::Negative,
            _ => Self::None,
        }
    }

    /// `+1`, `-1`, or `0` for display.
    pub fn sign(self) -> i8 {
        match self {
            Self::Positive => 1,
            Self::Negative => -1,
            Self::None => 0,
        }
    }
}

/// A point annotated with its z-score for one evaluation pass.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredPoint {
    /// The measurement.
    pub point: QcPoint,
    /// `(value - mean) / sd` under the limit used for this pass.
    pub z: f64,
}

impl ScoredPoint {
    /// Side of the mean.
    pub fn side(&self) -> Side {
        Side::of(self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx() -> ContextKey {
        ContextKey::new("a", "l", "v", "m")
    }

    #[test]
    fn side_of_zero_is_none() {
        assert_eq!(Side::of(0.0), Side::None);
        assert_eq!(Side::of(-0.0), Side::None);
        assert_eq!(Side::of(f64::NAN), Side::None);
        assert_eq!(Side::of(0.01), Side::Positive);
        assert_eq!(Side::of(-3.0), Side::Negative);
    }

    #[test]
    fn key_orders_by_date_then_id() {
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();

        let mut a = QcPoint::new(ctx(), day, 1.0);
        a.id = PointId::from_raw("b");
        let mut b = QcPoint::new(ctx(), day, 2.0);
        b.id = PointId::from_raw("a");
        let mut c = QcPoint::new(ctx(), later, 3.0);
        c.id = PointId::from_raw("0");

        let mut keys = vec![c.key(), a.key(), b.key()];
        keys.sort();
        assert_eq!(keys, vec![b.key(), a.key(), c.key()]);
    }
}
