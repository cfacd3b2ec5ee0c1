//! Branded ID newtypes for type safety.
//!
//! Every entity the engine touches has a distinct ID type implemented as a
//! newtype wrapper around `String`. This prevents accidentally passing a lot
//! ID where a machine ID is expected.
//!
//! Generated IDs are UUID v7 (time-ordered) via [`uuid::Uuid::now_v7`], so
//! the lexicographic order of two generated [`PointId`]s matches the order
//! they were created in. The engine relies on this to break ties between
//! points that share an entry date.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Generate a new UUID v7 string (time-ordered).
fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new random ID (UUID v7, time-ordered).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Create from an existing string value.
            #[must_use]
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

branded_id!(
    /// Analyte being measured (e.g. glucose).
    AnalyteId
);
branded_id!(
    /// Reagent lot the measurement was taken with.
    LotId
);
branded_id!(
    /// QC material level (e.g. normal, pathological).
    QcLevelId
);
branded_id!(
    /// Instrument the measurement was taken on.
    MachineId
);
branded_id!(
    /// Identity of one QC measurement. Doubles as the same-timestamp tie-break.
    PointId
);
branded_id!(
    /// Identity of one rule definition.
    RuleId
);
branded_id!(
    /// Identity of one persisted violation.
    ViolationId
);
