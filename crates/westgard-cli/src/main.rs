//! # westgard
//!
//! Operator CLI for the Westgard QC evaluation engine. Every command prints
//! JSON to stdout; logs go to stderr.

#![deny(unsafe_code)]

mod commands;
mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use westgard_core::{ContextKey, ViolationStatus};

/// Westgard QC rule evaluation.
#[derive(Parser, Debug)]
#[command(name = "westgard", version, about = "Westgard QC rule evaluation")]
struct Cli {
    /// Settings file (defaults to `~/.westgard/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// `SQLite` database path (overrides settings).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Inspect and seed rule definitions.
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Manage control limits.
    #[command(subcommand)]
    Limit(LimitCommand),
    /// Record, edit, or delete QC points. Each write is evaluated.
    #[command(subcommand)]
    Point(PointCommand),
    /// Inspect and review violations.
    #[command(subcommand)]
    Violations(ViolationsCommand),
    /// Re-evaluate every point of a context in chronological order.
    Replay(ReplayArgs),
}

#[derive(Subcommand, Debug)]
enum RulesCommand {
    /// List stored rules.
    List,
    /// Insert the standard catalog and any rules from settings.
    Seed,
    /// Turn a rule on or off.
    SetActive {
        /// Rule ID.
        id: String,
        /// `true` or `false`.
        #[arg(action = ArgAction::Set)]
        active: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LimitCommand {
    /// Set the mean and SD for a context.
    Set {
        #[command(flatten)]
        context: ContextArgs,
        /// Target mean.
        #[arg(long, allow_negative_numbers = true)]
        mean: f64,
        /// Standard deviation.
        #[arg(long)]
        sd: f64,
        /// Coefficient of variation, percent.
        #[arg(long)]
        cv: Option<f64>,
        /// Total allowable error, percent.
        #[arg(long)]
        tea: Option<f64>,
        /// Re-evaluate the context under the new limit.
        #[arg(long)]
        replay: bool,
    },
    /// List every stored limit.
    List,
}

#[derive(Subcommand, Debug)]
enum PointCommand {
    /// Record a new measurement.
    Add {
        #[command(flatten)]
        context: ContextArgs,
        /// Measured value.
        #[arg(long, allow_negative_numbers = true)]
        value: f64,
        /// Entry date, RFC 3339 (defaults to now).
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
    /// Change a measurement's value, date, or context.
    Edit {
        /// Point ID.
        id: String,
        /// New value.
        #[arg(long, allow_negative_numbers = true)]
        value: Option<f64>,
        /// New entry date, RFC 3339.
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        #[command(flatten)]
        context: ContextOverride,
    },
    /// Delete a measurement and its violations.
    Delete {
        /// Point ID.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ViolationsCommand {
    /// List violations for a context.
    List {
        #[command(flatten)]
        context: ContextArgs,
        /// Only violations in this review state.
        #[arg(long)]
        status: Option<ViolationStatus>,
        /// Only violations at this point.
        #[arg(long)]
        point: Option<String>,
    },
    /// Record a reviewer's action on a violation.
    Review {
        /// Violation ID.
        id: String,
        /// New review state.
        #[arg(long)]
        status: ViolationStatus,
        /// Corrective action taken.
        #[arg(long)]
        action: Option<String>,
        /// Staff member handling the violation.
        #[arg(long)]
        staff: Option<String>,
    },
}

/// The four IDs naming one control-limit series.
#[derive(Args, Debug, Clone)]
struct ContextArgs {
    /// Analyte ID.
    #[arg(long)]
    analyte: String,
    /// Reagent lot ID.
    #[arg(long)]
    lot: String,
    /// QC level ID.
    #[arg(long)]
    level: String,
    /// Instrument ID.
    #[arg(long)]
    machine: String,
}

impl ContextArgs {
    fn key(&self) -> ContextKey {
        ContextKey::new(
            self.analyte.as_str(),
            self.lot.as_str(),
            self.level.as_str(),
            self.machine.as_str(),
        )
    }
}

/// Context fields to change on edit. Unset fields keep their value.
#[derive(Args, Debug, Clone, Default)]
struct ContextOverride {
    /// New analyte ID.
    #[arg(long)]
    analyte: Option<String>,
    /// New reagent lot ID.
    #[arg(long)]
    lot: Option<String>,
    /// New QC level ID.
    #[arg(long)]
    level: Option<String>,
    /// New instrument ID.
    #[arg(long)]
    machine: Option<String>,
}

impl ContextOverride {
    fn apply(&self, context: &ContextKey) -> ContextKey {
        let mut next = context.clone();
        if let Some(analyte) = &self.analyte {
            next.analyte = analyte.as_str().into();
        }
        if let Some(lot) = &self.lot {
            next.lot = lot.as_str().into();
        }
        if let Some(level) = &self.level {
            next.level = level.as_str().into();
        }
        if let Some(machine) = &self.machine {
            next.machine = machine.as_str().into();
        }
        next
    }
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// Replay every context that has a control limit.
    #[arg(long, conflicts_with_all = ["analyte", "lot", "level", "machine"])]
    all: bool,
    /// Analyte ID.
    #[arg(long, required_unless_present = "all")]
    analyte: Option<String>,
    /// Reagent lot ID.
    #[arg(long, required_unless_present = "all")]
    lot: Option<String>,
    /// QC level ID.
    #[arg(long, required_unless_present = "all")]
    level: Option<String>,
    /// Instrument ID.
    #[arg(long, required_unless_present = "all")]
    machine: Option<String>,
}

impl ReplayArgs {
    /// `None` means every context.
    fn key(&self) -> Option<ContextKey> {
        match (&self.analyte, &self.lot, &self.level, &self.machine) {
            (Some(analyte), Some(lot), Some(level), Some(machine)) if !self.all => Some(
                ContextKey::new(analyte.as_str(), lot.as_str(), level.as_str(), machine.as_str()),
            ),
            _ => None,
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .settings
        .clone()
        .unwrap_or_else(westgard_settings::settings_path);
    let mut settings = westgard_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    if let Some(db) = &args.db {
        settings.database.path = Some(db.to_string_lossy().into_owned());
    }

    telemetry::init_telemetry(&settings.logging);

    let app = commands::App::open(settings).context("Failed to open database")?;
    let output = app.run(args.command)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
