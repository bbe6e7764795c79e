//! Sync command - Run reconciliation cycles
//!
//! Provides the `drivemirror sync` CLI command which:
//! 1. Loads configuration and opens the database
//! 2. Wires the Graph, SQLite and local mirror adapters into a SyncEngine
//! 3. Runs one cycle for the given principal, or for every stored principal
//! 4. Displays the cycle reports
//!
//! Ctrl-C cancels the running cycles between listing pages.

use anyhow::{bail, Context, Result};
use clap::Args;
use drivemirror_core::{domain::PrincipalId, ports::ICredentialStore};
use drivemirror_sync::{CycleError, CycleReport, SyncEngine};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{parse_principal, AppContext};
use crate::output::{format_duration, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Principal to synchronize (its email)
    #[arg(required_unless_present = "all")]
    pub principal: Option<String>,

    /// Synchronize every signed-in principal
    #[arg(long, conflicts_with = "principal")]
    pub all: bool,

    /// Run the cycles of different principals concurrently
    #[arg(long, requires = "all")]
    pub parallel: bool,
}

/// How one principal's cycle ended
enum Outcome {
    Synced(CycleReport),
    Skipped,
    Failed(CycleError),
}

impl Outcome {
    fn from_result(result: Result<CycleReport, CycleError>) -> Self {
        match result {
            Ok(report) => Outcome::Synced(report),
            Err(CycleError::AlreadyRunning(_)) => Outcome::Skipped,
            Err(e) => Outcome::Failed(e),
        }
    }

    fn to_json(&self, principal: &PrincipalId) -> serde_json::Value {
        match self {
            Outcome::Synced(report) => serde_json::json!({
                "principal": principal,
                "status": "synced",
                "report": report,
            }),
            Outcome::Skipped => serde_json::json!({
                "principal": principal,
                "status": "skipped",
                "reason": "a cycle is already running",
            }),
            Outcome::Failed(e) => serde_json::json!({
                "principal": principal,
                "status": "failed",
                "error": e.to_string(),
                "reauth_required": e.needs_reauth(),
            }),
        }
    }
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);

        // Step 1: Open the store and resolve the targets
        let store = ctx.open_store().await?;
        let targets: Vec<PrincipalId> = if self.all {
            store
                .list()
                .await
                .context("Failed to list principals")?
                .into_iter()
                .map(|p| p.id().clone())
                .collect()
        } else {
            let raw = self
                .principal
                .as_deref()
                .context("A principal or --all is required")?;
            vec![parse_principal(raw)?]
        };

        if targets.is_empty() {
            formatter.info("No principals. Run 'drivemirror auth login' first.");
            return Ok(());
        }

        // Step 2: Wire the engine
        let engine = ctx.sync_engine(store)?;

        // Step 3: Run
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                on_interrupt.cancel();
            }
        });

        info!(principals = targets.len(), parallel = self.parallel, "Starting sync");
        let outcomes = if self.parallel {
            join_all(targets.iter().map(|p| run_one(&engine, p, &cancel))).await
        } else {
            let mut outcomes = Vec::with_capacity(targets.len());
            for principal in &targets {
                outcomes.push(run_one(&engine, principal, &cancel).await);
            }
            outcomes
        };

        // Step 4: Display
        if format == OutputFormat::Json {
            let rows: Vec<_> = targets
                .iter()
                .zip(&outcomes)
                .map(|(p, o)| o.to_json(p))
                .collect();
            formatter.print_json(&serde_json::Value::Array(rows));
        } else {
            for (principal, outcome) in targets.iter().zip(&outcomes) {
                display_outcome(principal, outcome, &*formatter);
            }
        }

        let failed = outcomes
            .iter()
            .filter(|o| matches!(o, Outcome::Failed(_)))
            .count();
        if failed > 0 {
            bail!("{failed} sync cycle{} failed", plural(failed));
        }
        Ok(())
    }
}

async fn run_one(engine: &SyncEngine, principal: &PrincipalId, cancel: &CancellationToken) -> Outcome {
    Outcome::from_result(engine.run_cycle(principal, cancel).await)
}

fn display_outcome(principal: &PrincipalId, outcome: &Outcome, formatter: &dyn OutputFormatter) {
    match outcome {
        Outcome::Skipped => {
            formatter.warn(&format!("{principal}: a cycle is already running, skipping"));
        }
        Outcome::Failed(e) => {
            formatter.error(&format!("{principal}: {e}"));
            if e.needs_reauth() {
                formatter.info("Run 'drivemirror auth login' to sign in again.");
            }
        }
        Outcome::Synced(report) => {
            let changes = report.files_downloaded + report.entries_relocated + report.entries_deleted;
            if changes == 0 && report.is_clean() {
                formatter.success(&format!("{principal}: already up to date"));
            } else {
                formatter.success(&format!(
                    "{principal}: synced in {}",
                    format_duration(report.duration_ms)
                ));
            }

            if report.files_downloaded > 0 {
                formatter.info(&format!(
                    "Downloaded: {} file{} ({} bytes)",
                    report.files_downloaded,
                    plural(report.files_downloaded as usize),
                    report.bytes_downloaded
                ));
            }
            if report.entries_relocated > 0 {
                formatter.info(&format!(
                    "Moved:      {} file{}",
                    report.entries_relocated,
                    plural(report.entries_relocated as usize)
                ));
            }
            if report.entries_deleted > 0 {
                formatter.info(&format!(
                    "Removed:    {} entr{}",
                    report.entries_deleted,
                    if report.entries_deleted == 1 { "y" } else { "ies" }
                ));
            }

            if !report.is_clean() {
                formatter.warn(&format!(
                    "{} entr{} not reconciled:",
                    report.errors.len(),
                    if report.errors.len() == 1 { "y" } else { "ies" }
                ));
                for error in &report.errors {
                    formatter.info(&format!("  - {error}"));
                }
            }
        }
    }
}
