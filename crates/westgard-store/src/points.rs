use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, instrument};
use westgard_core::{ContextKey, PointId, PointKey, QcPoint};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const POINT_COLUMNS: &str = "id, analyte_id, lot_id, qc_level_id, machine_id, entry_date, value";

/// Recorded QC measurements.
#[derive(Clone, Debug)]
pub struct PointRepo {
    db: Database,
}

impl PointRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Record a new point.
    #[instrument(skip(self, point), fields(point_id = %point.id, context = %point.context))]
    pub fn insert(&self, point: &QcPoint) -> Result<(), StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO qc_points
                    (id, analyte_id, lot_id, qc_level_id, machine_id, entry_date, value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
                rusqlite::params![
                    point.id.as_str(),
                    point.context.analyte.as_str(),
                    point.context.lot.as_str(),
                    point.context.level.as_str(),
                    point.context.machine.as_str(),
                    row_helpers::format_timestamp(&point.entry_date),
                    point.value,
                    now,
                ],
            )?;
            Ok(())
        })
    }

    /// Replace a point's context, date, and value. Returns the previous version.
    #[instrument(skip(self, point), fields(point_id = %point.id))]
    pub fn update(&self, point: &QcPoint) -> Result<QcPoint, StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let previous = fetch(conn, &point.id)?
                .ok_or_else(|| StoreError::NotFound(format!("point {}", point.id)))?;
            let _ = conn.execute(
                "UPDATE qc_points SET analyte_id = ?1, lot_id = ?2, qc_level_id = ?3, machine_id = ?4,
                        entry_date = ?5, value = ?6, updated_at = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    point.context.analyte.as_str(),
                    point.context.lot.as_str(),
                    point.context.level.as_str(),
                    point.context.machine.as_str(),
                    row_helpers::format_timestamp(&point.entry_date),
                    point.value,
                    now,
                    point.id.as_str(),
                ],
            )?;
            Ok(previous)
        })
    }

    /// Remove a point. Returns the removed version.
    #[instrument(skip(self), fields(point_id = %id))]
    pub fn delete(&self, id: &PointId) -> Result<QcPoint, StoreError> {
        self.db.with_conn(|conn| {
            let previous =
                fetch(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("point {id}")))?;
            let _ = conn.execute("DELETE FROM qc_points WHERE id = ?1", [id.as_str()])?;
            Ok(previous)
        })
    }

    /// A point by ID.
    #[instrument(skip(self), fields(point_id = %id))]
    pub fn get(&self, id: &PointId) -> Result<QcPoint, StoreError> {
        self.db.with_conn(|conn| {
            fetch(conn, id)?.ok_or_else(|| StoreError::NotFound(format!("point {id}")))
        })
    }

    /// Up to `limit` most recent points of `context` at or before `at`,
    /// oldest first.
    #[instrument(skip(self, at), fields(context = %context))]
    pub fn trailing(
        &self,
        context: &ContextKey,
        at: &PointKey,
        limit: usize,
    ) -> Result<Vec<QcPoint>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let at_date = row_helpers::format_timestamp(&at.entry_date);

        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POINT_COLUMNS} FROM qc_points
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4
                   AND (entry_date < ?5 OR (entry_date = ?5 AND id <= ?6))
                 ORDER BY entry_date DESC, id DESC
                 LIMIT ?7"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                context.analyte.as_str(),
                context.lot.as_str(),
                context.level.as_str(),
                context.machine.as_str(),
                at_date,
                at.id.as_str(),
                limit,
            ])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(row_to_point(row)?);
            }
            points.reverse();
            debug!(fetched = points.len(), "trailing points loaded");
            Ok(points)
        })
    }

    /// Every point of `context`, oldest first.
    #[instrument(skip(self), fields(context = %context))]
    pub fn for_context(&self, context: &ContextKey) -> Result<Vec<QcPoint>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {POINT_COLUMNS} FROM qc_points
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4
                 ORDER BY entry_date ASC, id ASC"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                context.analyte.as_str(),
                context.lot.as_str(),
                context.level.as_str(),
                context.machine.as_str(),
            ])?;
            let mut points = Vec::new();
            while let Some(row) = rows.next()? {
                points.push(row_to_point(row)?);
            }
            Ok(points)
        })
    }
}

fn fetch(conn: &Connection, id: &PointId) -> Result<Option<QcPoint>, StoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {POINT_COLUMNS} FROM qc_points WHERE id = ?1"))?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => row_to_point(row).map(Some),
        None => Ok(None),
    }
}

fn row_to_point(row: &rusqlite::Row<'_>) -> Result<QcPoint, StoreError> {
    let entry_date: String = row_helpers::get(row, 5, "qc_points", "entry_date")?;
    Ok(QcPoint {
        id: PointId::from_raw(row_helpers::get::<String>(row, 0, "qc_points", "id")?),
        context: row_helpers::get_context(row, 1, "qc_points")?,
        entry_date: row_helpers::parse_timestamp(&entry_date, "qc_points", "entry_date")?,
        value: row_helpers::get(row, 6, "qc_points", "value")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{DateTime, Duration, TimeZone};

    fn ctx() -> ContextKey {
        ContextKey::new("glu", "lot1", "L1", "m1")
    }

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap() + Duration::days(n)
    }

    fn point(id: &str, d: i64, value: f64) -> QcPoint {
        QcPoint {
            id: PointId::from_raw(id),
            context: ctx(),
            entry_date: day(d),
            value,
        }
    }

    fn ids(points: &[QcPoint]) -> Vec<&str> {
        points.iter().map(|p| p.id.as_str()).collect()
    }

    fn repo() -> PointRepo {
        PointRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn insert_and_get() {
        let repo = repo();
        let p = point("p1", 0, 101.5);
        repo.insert(&p).unwrap();
        assert_eq!(repo.get(&p.id).unwrap(), p);
    }

    #[test]
    fn get_missing_is_not_found() {
        assert_matches!(repo().get(&PointId::from_raw("nope")), Err(StoreError::NotFound(_)));
    }

    #[test]
    fn trailing_is_bounded_inclusive_and_ascending() {
        let repo = repo();
        for (id, d) in [("p1", 1), ("p2", 2), ("p3", 3), ("p4", 4), ("p5", 5)] {
            repo.insert(&point(id, d, 0.0)).unwrap();
        }
        let got = repo.trailing(&ctx(), &point("p4", 4, 0.0).key(), 3).unwrap();
        assert_eq!(ids(&got), vec!["p2", "p3", "p4"]);
    }

    #[test]
    fn trailing_breaks_same_date_ties_on_id() {
        let repo = repo();
        for id in ["b", "a", "c"] {
            repo.insert(&point(id, 1, 0.0)).unwrap();
        }
        let got = repo.trailing(&ctx(), &point("b", 1, 0.0).key(), 10).unwrap();
        assert_eq!(ids(&got), vec!["a", "b"]);
    }

    #[test]
    fn trailing_ignores_other_contexts() {
        let repo = repo();
        repo.insert(&point("p1", 1, 0.0)).unwrap();
        let mut foreign = point("x1", 1, 0.0);
        foreign.context = ContextKey::new("glu", "lot1", "L2", "m1");
        repo.insert(&foreign).unwrap();

        let got = repo.trailing(&ctx(), &point("p9", 9, 0.0).key(), 10).unwrap();
        assert_eq!(ids(&got), vec!["p1"]);
    }

    #[test]
    fn update_returns_previous() {
        let repo = repo();
        repo.insert(&point("p1", 1, 10.0)).unwrap();
        let previous = repo.update(&point("p1", 2, 20.0)).unwrap();
        assert_eq!(previous.value, 10.0);
        assert_eq!(repo.get(&PointId::from_raw("p1")).unwrap().entry_date, day(2));
    }

    #[test]
    fn update_missing_is_not_found() {
        assert_matches!(repo().update(&point("p1", 1, 0.0)), Err(StoreError::NotFound(_)));
    }

    #[test]
    fn delete_returns_removed_point() {
        let repo = repo();
        repo.insert(&point("p1", 1, 10.0)).unwrap();
        let removed = repo.delete(&PointId::from_raw("p1")).unwrap();
        assert_eq!(removed.value, 10.0);
        assert!(repo.for_context(&ctx()).unwrap().is_empty());
    }

    #[test]
    fn for_context_orders_chronologically() {
        let repo = repo();
        for (id, d) in [("p3", 3), ("p1", 1), ("p2", 2)] {
            repo.insert(&point(id, d, 0.0)).unwrap();
        }
        assert_eq!(ids(&repo.for_context(&ctx()).unwrap()), vec!["p1", "p2", "p3"]);
    }
}
