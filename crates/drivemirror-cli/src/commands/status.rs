//! Status command - Display per-principal sync status
//!
//! Provides the `drivemirror status` CLI command which shows, for every
//! signed-in principal (or just the one given):
//! 1. The state of its last cycle and when it finished
//! 2. The number of mirrored entries
//! 3. The last error, if the last cycle failed

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use drivemirror_core::{
    domain::SyncState,
    usecases::{PrincipalSummary, StatusQuery},
};

use super::{parse_principal, AppContext};
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Only show this principal
    pub principal: Option<String>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);

        let store = ctx.open_store().await?;
        let query = StatusQuery::new(store.clone(), store);

        let summaries = match &self.principal {
            Some(raw) => {
                let id = parse_principal(raw)?;
                match query.status(&id).await? {
                    Some(summary) => vec![summary],
                    None => {
                        formatter.error(&format!(
                            "{id} is not signed in. Run 'drivemirror auth login' first."
                        ));
                        return Ok(());
                    }
                }
            }
            None => query.list_principals().await?,
        };

        if format == OutputFormat::Json {
            formatter.print_json(&serde_json::to_value(&summaries)?);
            return Ok(());
        }

        if summaries.is_empty() {
            formatter.info("No principals. Run 'drivemirror auth login' to add one.");
            return Ok(());
        }

        for summary in &summaries {
            display_summary(summary, &*formatter);
        }
        Ok(())
    }
}

fn display_summary(summary: &PrincipalSummary, formatter: &dyn OutputFormatter) {
    let headline = format!("{} ({})", summary.id, summary.display_name);
    match summary.state {
        SyncState::Error => formatter.error(&headline),
        SyncState::Idle | SyncState::Running => formatter.success(&headline),
    }

    formatter.info(&format!("State:       {}", summary.state));
    formatter.info(&format!("Last sync:   {}", relative_time(summary.last_finished, Utc::now())));
    formatter.info(&format!("Entries:     {}", summary.entry_count));
    if summary.token_expires_at <= Utc::now() {
        formatter.info("Token:       expired (refreshed on next sync)");
    }
    if let Some(error) = &summary.last_error {
        formatter.info(&format!("Last error:  {error}"));
    }
    formatter.info("");
}

/// Formats a timestamp relative to `now` ("never", "5 minutes ago", ...)
fn relative_time(at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(at) = at else {
        return "never".to_string();
    };

    let secs = (now - at).num_seconds().max(0);
    let (value, unit) = match secs {
        0..=59 => return "just now".to_string(),
        60..=3599 => (secs / 60, "minute"),
        3600..=86_399 => (secs / 3600, "hour"),
        _ => (secs / 86_400, "day"),
    };
    format!("{value} {unit}{} ago", if value == 1 { "" } else { "s" })
}
