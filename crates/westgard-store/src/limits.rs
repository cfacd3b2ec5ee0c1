use chrono::Utc;
use rusqlite::OptionalExtension;
use tracing::instrument;
use westgard_core::{ContextKey, ControlLimit};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Control limits, one row per context.
#[derive(Clone, Debug)]
pub struct LimitRepo {
    db: Database,
}

impl LimitRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace the limit for a context.
    #[instrument(skip(self, limit), fields(context = %context, mean = limit.mean, sd = limit.sd))]
    pub fn set(&self, context: &ContextKey, limit: &ControlLimit) -> Result<(), StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO control_limits
                    (analyte_id, lot_id, qc_level_id, machine_id, mean, sd, cv, tea, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT (analyte_id, lot_id, qc_level_id, machine_id) DO UPDATE SET
                    mean = excluded.mean,
                    sd = excluded.sd,
                    cv = excluded.cv,
                    tea = excluded.tea,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    context.analyte.as_str(),
                    context.lot.as_str(),
                    context.level.as_str(),
                    context.machine.as_str(),
                    limit.mean,
                    limit.sd,
                    limit.cv,
                    limit.tea,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// The limit for a context, if configured.
    #[instrument(skip(self), fields(context = %context))]
    pub fn get(&self, context: &ContextKey) -> Result<Option<ControlLimit>, StoreError> {
        self.db.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT mean, sd, cv, tea FROM control_limits
                     WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4",
                    rusqlite::params![
                        context.analyte.as_str(),
                        context.lot.as_str(),
                        context.level.as_str(),
                        context.machine.as_str(),
                    ],
                    |row| {
                        Ok((
                            row.get::<_, f64>(0)?,
                            row.get::<_, f64>(1)?,
                            row.get::<_, Option<f64>>(2)?,
                            row.get::<_, Option<f64>>(3)?,
                        ))
                    },
                )
                .optional()?;
            Ok(raw.map(|(mean, sd, cv, tea)| ControlLimit { mean, sd, cv, tea }))
        })
    }

    /// Remove the limit for a context. Returns whether one existed.
    #[instrument(skip(self), fields(context = %context))]
    pub fn delete(&self, context: &ContextKey) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM control_limits
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4",
                rusqlite::params![
                    context.analyte.as_str(),
                    context.lot.as_str(),
                    context.level.as_str(),
                    context.machine.as_str(),
                ],
            )?;
            Ok(removed > 0)
        })
    }

    /// Every configured limit, ordered by context.
    #[instrument(skip(self))]
    pub fn list(&self) -> Result<Vec<(ContextKey, ControlLimit)>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT analyte_id, lot_id, qc_level_id, machine_id, mean, sd, cv, tea
                 FROM control_limits
                 ORDER BY analyte_id, lot_id, qc_level_id, machine_id",
            )?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let context = row_helpers::get_context(row, 0, "control_limits")?;
                let limit = ControlLimit {
                    mean: row_helpers::get(row, 4, "control_limits", "mean")?,
                    sd: row_helpers::get(row, 5, "control_limits", "sd")?,
                    cv: row_helpers::get_opt(row, 6, "control_limits", "cv")?,
                    tea: row_helpers::get_opt(row, 7, "control_limits", "tea")?,
                };
                results.push((context, limit));
            }
            Ok(results)
        })
    }
}
