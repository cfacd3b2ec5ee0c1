//! Command handlers. Each returns the JSON document printed to stdout.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use westgard_core::{ControlLimit, PointId, QcPoint, RuleId, ViolationId, ViolationWorkflow};
use westgard_engine::{EngineOptions, EvaluationEngine, PointChange};
use westgard_settings::WestgardSettings;
use westgard_store::{Database, SqliteSources};

use crate::{
    Command, LimitCommand, PointCommand, ReplayArgs, RulesCommand, ViolationsCommand,
};

/// Settings, repositories, and the engine wired over them.
pub(crate) struct App {
    settings: WestgardSettings,
    store: Arc<SqliteSources>,
    engine: EvaluationEngine,
}

impl App {
    /// Open the database named by `settings`.
    pub(crate) fn open(settings: WestgardSettings) -> Result<Self> {
        let path = westgard_settings::database_path(&settings);
        let db = Database::open(&path)?;
        let store = Arc::new(SqliteSources::new(&db));
        let options = EngineOptions {
            lock_prune_threshold: settings.engine.lock_prune_threshold,
        };
        let engine = EvaluationEngine::from_shared(store.clone(), options);
        Ok(Self {
            settings,
            store,
            engine,
        })
    }

    pub(crate) fn run(&self, command: Command) -> Result<Value> {
        match command {
            Command::Rules(cmd) => self.rules(cmd),
            Command::Limit(cmd) => self.limit(cmd),
            Command::Point(cmd) => self.point(cmd),
            Command::Violations(cmd) => self.violations(cmd),
            Command::Replay(args) => self.replay(&args),
        }
    }

    fn rules(&self, cmd: RulesCommand) -> Result<Value> {
        match cmd {
            RulesCommand::List => Ok(serde_json::to_value(self.store.rules.list()?)?),
            RulesCommand::Seed => {
                let catalog = if self.settings.engine.use_default_catalog {
                    self.store.rules.seed_catalog()?
                } else {
                    0
                };
                let custom = self.settings.rules.as_deref().unwrap_or_default();
                for rule in custom {
                    self.store.rules.upsert(rule)?;
                }
                info!(catalog, custom = custom.len(), "rules seeded");
                Ok(json!({ "catalogInserted": catalog, "customUpserted": custom.len() }))
            }
            RulesCommand::SetActive { id, active } => {
                let rule = self.store.rules.set_active(&RuleId::from(id), active)?;
                Ok(serde_json::to_value(rule)?)
            }
        }
    }

    fn limit(&self, cmd: LimitCommand) -> Result<Value> {
        match cmd {
            LimitCommand::Set {
                context,
                mean,
                sd,
                cv,
                tea,
                replay,
            } => {
                let key = context.key();
                let limit = ControlLimit { mean, sd, cv, tea };
                if let Err(e) = limit.validate() {
                    warn!(context = %key, error = %e, "storing a limit the engine cannot evaluate against");
                }
                self.store.limits.set(&key, &limit)?;
                let summary = replay.then(|| self.engine.replay_context(&key));
                Ok(json!({ "context": key, "limit": limit, "replay": summary }))
            }
            LimitCommand::List => {
                let limits: Vec<Value> = self
                    .store
                    .limits
                    .list()?
                    .into_iter()
                    .map(|(context, limit)| json!({ "context": context, "limit": limit }))
                    .collect();
                Ok(Value::Array(limits))
            }
        }
    }

    fn point(&self, cmd: PointCommand) -> Result<Value> {
        let (point, change) = match cmd {
            PointCommand::Add { context, value, at } => {
                let point = QcPoint::new(context.key(), at.unwrap_or_else(Utc::now), value);
                self.store.points.insert(&point)?;
                (point.clone(), PointChange::Created(point))
            }
            PointCommand::Edit {
                id,
                value,
                at,
                context,
            } => {
                let stored = self.store.points.get(&PointId::from(id))?;
                let current = QcPoint {
                    context: context.apply(&stored.context),
                    entry_date: at.unwrap_or(stored.entry_date),
                    value: value.unwrap_or(stored.value),
                    id: stored.id,
                };
                let previous = self.store.points.update(&current)?;
                (
                    current.clone(),
                    PointChange::Updated {
                        previous,
                        current,
                    },
                )
            }
            PointCommand::Delete { id } => {
                let removed = self.store.points.delete(&PointId::from(id))?;
                (removed.clone(), PointChange::Deleted(removed))
            }
        };
        let report = self.engine.on_point_written(change);
        Ok(json!({ "point": point, "report": report }))
    }

    fn violations(&self, cmd: ViolationsCommand) -> Result<Value> {
        match cmd {
            ViolationsCommand::List {
                context,
                status,
                point,
            } => {
                let key = context.key();
                let violations: Vec<_> = match point {
                    Some(point) => self
                        .store
                        .violations
                        .at_point(&key, &PointId::from(point))?
                        .into_iter()
                        .filter(|v| status.is_none_or(|s| v.workflow.status == s))
                        .collect(),
                    None => self.store.violations.for_context(&key, status)?,
                };
                Ok(serde_json::to_value(violations)?)
            }
            ViolationsCommand::Review {
                id,
                status,
                action,
                staff,
            } => {
                let workflow = ViolationWorkflow {
                    action,
                    staff,
                    status,
                };
                let violation = self
                    .store
                    .violations
                    .set_workflow(&ViolationId::from(id), &workflow)?;
                Ok(serde_json::to_value(violation)?)
            }
        }
    }

    fn replay(&self, args: &ReplayArgs) -> Result<Value> {
        let contexts = match args.key() {
            Some(key) => vec![key],
            None => self
                .store
                .limits
                .list()?
                .into_iter()
                .map(|(context, _)| context)
                .collect(),
        };
        let results: Vec<Value> = contexts
            .into_iter()
            .map(|context| {
                let summary = self.engine.replay_context(&context);
                json!({ "context": context, "summary": summary })
            })
            .collect();
        Ok(Value::Array(results))
    }
}
