use rusqlite::Connection;
use tracing::{debug, instrument};
use westgard_core::{
    ContextKey, PointId, RuleId, Violation, ViolationId, ViolationStatus, ViolationWorkflow,
};
use westgard_engine::ReconcilePlan;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

const VIOLATION_COLUMNS: &str = "id, analyte_id, lot_id, qc_level_id, machine_id, rule_id, rule_code, point_id,
        entry_date, severity, explanation, z_score, action, staff, status, created_at, updated_at";

/// Persisted violations.
///
/// The engine writes through [`ViolationRepo::apply`] and
/// [`ViolationRepo::delete_for_point`], which never touch workflow columns.
/// Reviewers write through [`ViolationRepo::set_workflow`].
#[derive(Clone, Debug)]
pub struct ViolationRepo {
    db: Database,
}

impl ViolationRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// A violation by ID.
    #[instrument(skip(self), fields(violation_id = %id))]
    pub fn get(&self, id: &ViolationId) -> Result<Violation, StoreError> {
        self.db.with_conn(|conn| fetch(conn, id))
    }

    /// Violations recorded for one point of a context.
    #[instrument(skip(self), fields(context = %context, point_id = %point_id))]
    pub fn at_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<Vec<Violation>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIOLATION_COLUMNS} FROM violations
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4
                   AND point_id = ?5
                 ORDER BY rule_id"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                context.analyte.as_str(),
                context.lot.as_str(),
                context.level.as_str(),
                context.machine.as_str(),
                point_id.as_str(),
            ])?;
            collect(&mut rows)
        })
    }

    /// Violations of a context, optionally filtered by review status,
    /// ordered by entry date, point, and rule.
    #[instrument(skip(self), fields(context = %context))]
    pub fn for_context(
        &self,
        context: &ContextKey,
        status: Option<ViolationStatus>,
    ) -> Result<Vec<Violation>, StoreError> {
        let status = status.map(|s| s.to_string());
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VIOLATION_COLUMNS} FROM violations
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4
                   AND (?5 IS NULL OR status = ?5)
                 ORDER BY entry_date, point_id, rule_id"
            ))?;
            let mut rows = stmt.query(rusqlite::params![
                context.analyte.as_str(),
                context.lot.as_str(),
                context.level.as_str(),
                context.machine.as_str(),
                status,
            ])?;
            collect(&mut rows)
        })
    }

    /// Apply a reconciliation plan in one transaction.
    ///
    /// Deletes run first so a re-created rule never collides with the record
    /// it replaces. Updates rewrite engine-owned columns only.
    #[instrument(skip(self, plan), fields(context = %plan.context, point_id = %plan.point_id))]
    pub fn apply(&self, plan: &ReconcilePlan) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            for id in &plan.deletes {
                let _ = tx.execute("DELETE FROM violations WHERE id = ?1", [id.as_str()])?;
            }

            for violation in &plan.updates {
                let changed = tx.execute(
                    "UPDATE violations SET rule_code = ?1, entry_date = ?2, severity = ?3,
                            explanation = ?4, z_score = ?5, updated_at = ?6
                     WHERE id = ?7",
                    rusqlite::params![
                        violation.rule_code,
                        row_helpers::format_timestamp(&violation.entry_date),
                        violation.severity.to_string(),
                        violation.explanation,
                        violation.z_score,
                        violation.updated_at,
                        violation.id.as_str(),
                    ],
                )?;
                if changed == 0 {
                    return Err(StoreError::NotFound(format!("violation {}", violation.id)));
                }
            }

            for violation in &plan.creates {
                insert(&tx, violation)?;
            }

            tx.commit()?;
            debug!(
                created = plan.creates.len(),
                updated = plan.updates.len(),
                deleted = plan.deletes.len(),
                "reconcile plan applied"
            );
            Ok(())
        })
    }

    /// Delete every violation of one point in a context. Returns how many.
    #[instrument(skip(self), fields(context = %context, point_id = %point_id))]
    pub fn delete_for_point(
        &self,
        context: &ContextKey,
        point_id: &PointId,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM violations
                 WHERE analyte_id = ?1 AND lot_id = ?2 AND qc_level_id = ?3 AND machine_id = ?4
                   AND point_id = ?5",
                rusqlite::params![
                    context.analyte.as_str(),
                    context.lot.as_str(),
                    context.level.as_str(),
                    context.machine.as_str(),
                    point_id.as_str(),
                ],
            )?;
            Ok(removed)
        })
    }

    /// Record a reviewer's action, name, and status on a violation.
    #[instrument(skip(self, workflow), fields(violation_id = %id, status = %workflow.status))]
    pub fn set_workflow(
        &self,
        id: &ViolationId,
        workflow: &ViolationWorkflow,
    ) -> Result<Violation, StoreError> {
        self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE violations SET action = ?1, staff = ?2, status = ?3 WHERE id = ?4",
                rusqlite::params![
                    workflow.action,
                    workflow.staff,
                    workflow.status.to_string(),
                    id.as_str(),
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("violation {id}")));
            }
            fetch(conn, id)
        })
    }
}

fn insert(conn: &Connection, violation: &Violation) -> Result<(), StoreError> {
    let _ = conn.execute(
        &format!(
            "INSERT INTO violations ({VIOLATION_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)"
        ),
        rusqlite::params![
            violation.id.as_str(),
            violation.context.analyte.as_str(),
            violation.context.lot.as_str(),
            violation.context.level.as_str(),
            violation.context.machine.as_str(),
            violation.rule_id.as_str(),
            violation.rule_code,
            violation.point_id.as_str(),
            row_helpers::format_timestamp(&violation.entry_date),
            violation.severity.to_string(),
            violation.explanation,
            violation.z_score,
            violation.workflow.action,
            violation.workflow.staff,
            violation.workflow.status.to_string(),
            violation.created_at,
            violation.updated_at,
        ],
    )?;
    Ok(())
}

fn fetch(conn: &Connection, id: &ViolationId) -> Result<Violation, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {VIOLATION_COLUMNS} FROM violations WHERE id = ?1"
    ))?;
    let mut rows = stmt.query([id.as_str()])?;
    match rows.next()? {
        Some(row) => row_to_violation(row),
        None => Err(StoreError::NotFound(format!("violation {id}"))),
    }
}

fn collect(rows: &mut rusqlite::Rows<'_>) -> Result<Vec<Violation>, StoreError> {
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(row_to_violation(row)?);
    }
    Ok(results)
}

fn row_to_violation(row: &rusqlite::Row<'_>) -> Result<Violation, StoreError> {
    let entry_date: String = row_helpers::get(row, 8, "violations", "entry_date")?;
    let severity: String = row_helpers::get(row, 9, "violations", "severity")?;
    let status: String = row_helpers::get(row, 14, "violations", "status")?;

    Ok(Violation {
        id: ViolationId::from_raw(row_helpers::get::<String>(row, 0, "violations", "id")?),
        context: row_helpers::get_context(row, 1, "violations")?,
        rule_id: RuleId::from_raw(row_helpers::get::<String>(row, 5, "violations", "rule_id")?),
        rule_code: row_helpers::get(row, 6, "violations", "rule_code")?,
        point_id: PointId::from_raw(row_helpers::get::<String>(row, 7, "violations", "point_id")?),
        entry_date: row_helpers::parse_timestamp(&entry_date, "violations", "entry_date")?,
        severity: row_helpers::parse_enum(&severity, "violations", "severity")?,
        explanation: row_helpers::get(row, 10, "violations", "explanation")?,
        z_score: row_helpers::get(row, 11, "violations", "z_score")?,
        workflow: ViolationWorkflow {
            action: row_helpers::get_opt(row, 12, "violations", "action")?,
            staff: row_helpers::get_opt(row, 13, "violations", "staff")?,
            status: row_helpers::parse_enum(&status, "violations", "status")?,
        },
        created_at: row_helpers::get(row, 15, "violations", "created_at")?,
        updated_at: row_helpers::get(row, 16, "violations", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use westgard_core::{Severity, ViolationCandidate};
    use westgard_engine::reconcile;

    fn ctx() -> ContextKey {
        ContextKey::new("glu", "lot1", "L1", "m1")
    }

    fn candidate(rule: &str, point: &str, z: f64) -> ViolationCandidate {
        ViolationCandidate {
            context: ctx(),
            rule_id: RuleId::from_raw(format!("westgard.{rule}")),
            rule_code: rule.into(),
            point_id: PointId::from_raw(point),
            entry_date: Utc.with_ymd_and_hms(2024, 5, 2, 7, 15, 0).unwrap(),
            severity: Severity::Warning,
            explanation: "1 point exceeded ±2SD".into(),
            z_score: z,
        }
    }

    fn repo() -> ViolationRepo {
        ViolationRepo::new(Database::in_memory().unwrap())
    }

    fn apply(repo: &ViolationRepo, point: &str, candidates: Vec<ViolationCandidate>) {
        let point_id = PointId::from_raw(point);
        let existing = repo.at_point(&ctx(), &point_id).unwrap();
        let plan = reconcile(&ctx(), &point_id, candidates, existing);
        repo.apply(&plan).unwrap();
    }

    #[test]
    fn created_violation_reads_back_identically() {
        let repo = repo();
        apply(&repo, "p1", vec![candidate("1-2s", "p1", 2.5)]);

        let stored = repo.at_point(&ctx(), &PointId::from_raw("p1")).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(repo.get(&stored[0].id).unwrap(), stored[0]);
        assert_eq!(stored[0].workflow.status, ViolationStatus::Open);
    }

    #[test]
    fn update_keeps_reviewer_fields() {
        let repo = repo();
        apply(&repo, "p1", vec![candidate("1-2s", "p1", 2.5)]);
        let id = repo.at_point(&ctx(), &PointId::from_raw("p1")).unwrap()[0].id.clone();

        let workflow = ViolationWorkflow {
            action: Some("new reagent".into()),
            staff: Some("akim".into()),
            status: ViolationStatus::Resolved,
        };
        let _ = repo.set_workflow(&id, &workflow).unwrap();

        apply(&repo, "p1", vec![candidate("1-2s", "p1", 2.8)]);

        let after = repo.get(&id).unwrap();
        assert_eq!(after.workflow, workflow);
        assert_eq!(after.z_score, 2.8);
    }

    #[test]
    fn stale_rule_deleted_other_points_untouched() {
        let repo = repo();
        apply(&repo, "p1", vec![candidate("1-2s", "p1", 2.5)]);
        apply(&repo, "p2", vec![candidate("1-2s", "p2", 2.5)]);

        apply(&repo, "p2", Vec::new());

        assert!(repo.at_point(&ctx(), &PointId::from_raw("p2")).unwrap().is_empty());
        assert_eq!(repo.at_point(&ctx(), &PointId::from_raw("p1")).unwrap().len(), 1);
    }

    #[test]
    fn failed_update_rolls_back_whole_plan() {
        let repo = repo();
        apply(&repo, "p1", vec![candidate("1-3s", "p1", 3.5)]);
        let kept = repo.at_point(&ctx(), &PointId::from_raw("p1")).unwrap()[0].id.clone();

        let phantom = Violation::from_candidate(candidate("2-2s", "p1", 2.2));
        let plan = ReconcilePlan {
            context: ctx(),
            point_id: PointId::from_raw("p1"),
            creates: vec![Violation::from_candidate(candidate("1-2s", "p1", 2.5))],
            updates: vec![phantom],
            deletes: vec![kept.clone()],
            unchanged: Vec::new(),
        };

        assert_matches!(repo.apply(&plan), Err(StoreError::NotFound(_)));
        let remaining = repo.for_context(&ctx(), None).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, kept);
    }

    #[test]
    fn delete_for_point_counts_rows() {
        let repo = repo();
        apply(
            &repo,
            "p1",
            vec![candidate("1-2s", "p1", 3.5), candidate("1-3s", "p1", 3.5)],
        );
        assert_eq!(repo.delete_for_point(&ctx(), &PointId::from_raw("p1")).unwrap(), 2);
        assert_eq!(repo.delete_for_point(&ctx(), &PointId::from_raw("p1")).unwrap(), 0);
    }

    #[test]
    fn status_filter() {
        let repo = repo();
        apply(&repo, "p1", vec![candidate("1-2s", "p1", 2.5)]);
        apply(&repo, "p2", vec![candidate("1-2s", "p2", 2.5)]);
        let first = repo.at_point(&ctx(), &PointId::from_raw("p1")).unwrap()[0].id.clone();
        let _ = repo
            .set_workflow(
                &first,
                &ViolationWorkflow {
                    status: ViolationStatus::Acknowledged,
                    ..ViolationWorkflow::default()
                },
            )
            .unwrap();

        let open = repo.for_context(&ctx(), Some(ViolationStatus::Open)).unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].point_id.as_str(), "p2");
        assert_eq!(repo.for_context(&ctx(), None).unwrap().len(), 2);
    }

    #[test]
    fn set_workflow_on_missing_violation() {
        assert_matches!(
            repo().set_workflow(&ViolationId::from_raw("nope"), &ViolationWorkflow::default()),
            Err(StoreError::NotFound(_))
        );
    }
}
