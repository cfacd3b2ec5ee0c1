use chrono::Utc;
use tracing::{info, instrument, warn};
use westgard_core::{QcLevelId, RuleConfig, RuleConfigError, RuleId, westgard_catalog};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Administered rule records, stored as JSON.
///
/// Records are kept exactly as administered, including inactive or invalid
/// ones. Validation happens when the engine snapshots the rules for a pass.
#[derive(Clone, Debug)]
pub struct RuleRepo {
    db: Database,
}

impl RuleRepo {
    /// Repository over `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create or replace a rule record.
    #[instrument(skip(self, rule), fields(rule_id = %rule.id, code = %rule.code))]
    pub fn upsert(&self, rule: &RuleConfig) -> Result<(), StoreError> {
        let config = serde_json::to_string(rule)?;
        let now = row_helpers::format_timestamp(&Utc::now());
        self.db.with_conn(|conn| {
            let _ = conn.execute(
                "INSERT INTO rules (id, code, config, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (id) DO UPDATE SET
                    code = excluded.code,
                    config = excluded.config,
                    updated_at = excluded.updated_at",
                rusqlite::params![rule.id.as_str(), rule.code, config, now],
            )?;
            Ok(())
        })
    }

    /// Insert the built-in catalog rules that are not stored yet.
    ///
    /// Existing records with catalog IDs are left alone, so administrator
    /// edits survive reseeding. Returns how many rules were inserted.
    #[instrument(skip(self))]
    pub fn seed_catalog(&self) -> Result<usize, StoreError> {
        let now = row_helpers::format_timestamp(&Utc::now());
        let rules = westgard_catalog()
            .into_iter()
            .map(|rule| serde_json::to_string(&rule).map(|config| (rule, config)))
            .collect::<Result<Vec<_>, _>>()?;

        let inserted = self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut inserted = 0;
            for (rule, config) in &rules {
                inserted += tx.execute(
                    "INSERT OR IGNORE INTO rules (id, code, config, updated_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![rule.id.as_str(), rule.code, config, now],
                )?;
            }
            tx.commit()?;
            Ok(inserted)
        })?;

        info!(inserted, "catalog rules seeded");
        Ok(inserted)
    }

    /// A rule record by ID.
    #[instrument(skip(self), fields(rule_id = %id))]
    pub fn get(&self, id: &RuleId) -> Result<RuleConfig, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT config FROM rules WHERE id = ?1")?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_rule(row, 0),
                None => Err(StoreError::NotFound(format!("rule {id}"))),
            }
        })
    }

    /// Every readable rule record, ordered by ID.
    ///
    /// Rows whose config cannot be read are logged and left out.
    pub fn list(&self) -> Result<Vec<RuleConfig>, StoreError> {
        Ok(self
            .records()?
            .into_iter()
            .filter_map(|record| match record {
                Ok(rule) => Some(rule),
                Err(e) => {
                    warn!(error = %e, "unreadable rule record omitted");
                    None
                }
            })
            .collect())
    }

    /// Every rule row, ordered by ID, each parsed on its own.
    ///
    /// A row whose config does not deserialize becomes
    /// [`RuleConfigError::Malformed`] in its slot. Only a failed query fails
    /// the whole call.
    #[instrument(skip(self))]
    pub fn records(&self) -> Result<Vec<Result<RuleConfig, RuleConfigError>>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, config FROM rules ORDER BY id")?;
            let mut rows = stmt.query([])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row_helpers::get(row, 0, "rules", "id")?;
                let record = row_to_rule(row, 1).map_err(|e| RuleConfigError::Malformed {
                    rule_id: RuleId::from(id),
                    reason: e.to_string(),
                });
                results.push(record);
            }
            Ok(results)
        })
    }

    /// Records configured for `level`: those listing it and those listing no
    /// level at all. Unreadable rows are kept, since their levels are unknown.
    pub fn for_level(
        &self,
        level: &QcLevelId,
    ) -> Result<Vec<Result<RuleConfig, RuleConfigError>>, StoreError> {
        Ok(self
            .records()?
            .into_iter()
            .filter(|record| match record {
                Ok(rule) => rule.applies_to.is_empty() || rule.applies_to.contains(level),
                Err(_) => true,
            })
            .collect())
    }

    /// Activate or deactivate a rule.
    #[instrument(skip(self), fields(rule_id = %id))]
    pub fn set_active(&self, id: &RuleId, active: bool) -> Result<RuleConfig, StoreError> {
        let mut rule = self.get(id)?;
        rule.is_active = active;
        self.upsert(&rule)?;
        Ok(rule)
    }

    /// Remove a rule record. Returns whether it existed.
    #[instrument(skip(self), fields(rule_id = %id))]
    pub fn delete(&self, id: &RuleId) -> Result<bool, StoreError> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM rules WHERE id = ?1", [id.as_str()])?;
            Ok(removed > 0)
        })
    }
}

fn row_to_rule(row: &rusqlite::Row<'_>, idx: usize) -> Result<RuleConfig, StoreError> {
    let raw: String = row_helpers::get(row, idx, "rules", "config")?;
    row_helpers::parse_json(&raw, "rules", "config")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use westgard_core::CATALOG_RULE_IDS;

    fn repo() -> RuleRepo {
        RuleRepo::new(Database::in_memory().unwrap())
    }

    #[test]
    fn seed_inserts_catalog_once() {
        let repo = repo();
        assert_eq!(repo.seed_catalog().unwrap(), CATALOG_RULE_IDS.len());
        assert_eq!(repo.seed_catalog().unwrap(), 0);

        let ids: Vec<String> = repo.list().unwrap().into_iter().map(|r| r.id.into_inner()).collect();
        let mut expected: Vec<String> = CATALOG_RULE_IDS.iter().map(ToString::to_string).collect();
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[test]
    fn reseed_keeps_admin_edits() {
        let repo = repo();
        let _ = repo.seed_catalog().unwrap();
        let id = RuleId::from_raw("westgard.10x");
        let _ = repo.set_active(&id, false).unwrap();
        let _ = repo.seed_catalog().unwrap();
        assert!(!repo.get(&id).unwrap().is_active);
    }

    #[test]
    fn invalid_records_are_stored_verbatim() {
        let repo = repo();
        let mut rule = westgard_catalog().remove(0);
        rule.window_size = -3;
        repo.upsert(&rule).unwrap();
        assert_eq!(repo.get(&rule.id).unwrap(), rule);
    }

    #[test]
    fn level_filter_includes_unscoped_rules() {
        let repo = repo();
        let mut catalog = westgard_catalog();
        catalog[0].applies_to = vec![QcLevelId::from_raw("L3")];
        for rule in &catalog {
            repo.upsert(rule).unwrap();
        }
        assert_eq!(repo.for_level(&"L1".into()).unwrap().len(), catalog.len() - 1);
        assert!(repo.for_level(&"L1".into()).unwrap().iter().all(Result::is_ok));
        assert_eq!(repo.for_level(&"L3".into()).unwrap().len(), catalog.len());
    }

    fn insert_raw(repo: &RuleRepo, id: &str, config: &str) {
        repo.db
            .with_conn(|conn| {
                let _ = conn.execute(
                    "INSERT INTO rules (id, code, config, updated_at) VALUES (?1, 'bad', ?2, '')",
                    [id, config],
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn unreadable_row_does_not_hide_others() {
        let repo = repo();
        let _ = repo.seed_catalog().unwrap();
        insert_raw(&repo, "zz", r#"{"id":"zz","code":"bad","severity":"error"}"#);

        let records = repo.for_level(&"L1".into()).unwrap();
        assert_eq!(records.len(), CATALOG_RULE_IDS.len() + 1);
        assert_eq!(records.iter().filter(|r| r.is_ok()).count(), CATALOG_RULE_IDS.len());
        assert_matches!(
            records.last(),
            Some(Err(RuleConfigError::Malformed { rule_id, reason }))
                if rule_id.as_str() == "zz" && reason.contains("windowSize")
        );

        assert_eq!(repo.list().unwrap().len(), CATALOG_RULE_IDS.len());
        assert_matches!(repo.get(&"zz".into()), Err(StoreError::CorruptRow { .. }));
    }

    #[test]
    fn missing_rule_is_not_found() {
        assert_matches!(
            repo().set_active(&RuleId::from_raw("nope"), true),
            Err(StoreError::NotFound(_))
        );
    }

    #[test]
    fn delete_reports_existence() {
        let repo = repo();
        let _ = repo.seed_catalog().unwrap();
        assert!(repo.delete(&RuleId::from_raw("westgard.R-4s")).unwrap());
        assert!(!repo.delete(&RuleId::from_raw("westgard.R-4s")).unwrap());
    }
}
