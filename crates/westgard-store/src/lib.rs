//! # westgard-store
//!
//! SQLite persistence for the Westgard evaluation engine. One repository per
//! table, all sharing a [`Database`]; [`SqliteSources`] bundles them and
//! implements the engine's collaborator traits.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod limits;
pub mod points;
pub mod row_helpers;
pub mod rules;
pub mod schema;
pub mod sources;
pub mod violations;

pub use database::Database;
pub use error::StoreError;
pub use limits::LimitRepo;
pub use points::PointRepo;
pub use rules::RuleRepo;
pub use sources::SqliteSources;
pub use violations::ViolationRepo;
