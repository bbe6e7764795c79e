//! Auth commands - Device-code login and the list of signed-in principals
//!
//! Provides the `drivemirror auth` CLI subcommands:
//! 1. `login` - Starts the device-code grant, shows the verification URL and
//!    code, waits for the user to finish, and stores the principal.
//! 2. `list`  - Shows every stored principal and its token expiry.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use drivemirror_core::ports::ICredentialStore;
use tracing::{info, warn};

use super::AppContext;
use crate::output::{get_formatter, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum AuthCommand {
    /// Sign in a principal with the device-code flow
    Login {
        /// Open the verification page in the default browser
        #[arg(long)]
        open: bool,
    },
    /// List signed-in principals
    List,
}

impl AuthCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let fmt = get_formatter(format == OutputFormat::Json);
        match self {
            AuthCommand::Login { open } => self.execute_login(ctx, *open, &*fmt).await,
            AuthCommand::List => self.execute_list(ctx, format, &*fmt).await,
        }
    }

    /// Runs the device-code flow:
    /// 1. Request a device code
    /// 2. Show the instructions (and optionally open the browser)
    /// 3. Wait for the user to complete sign-in
    /// 4. Persist the principal
    async fn execute_login(
        &self,
        ctx: &AppContext,
        open: bool,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let store = ctx.open_store().await?;
        let auth = ctx.auth_manager(store)?;

        // Step 1: Request a device code
        let grant = auth
            .begin_interactive_auth()
            .await
            .context("Failed to start device authorization")?;

        // Step 2: Show instructions
        fmt.print_json(&serde_json::json!({
            "verification_uri": grant.verification_uri,
            "user_code": grant.user_code,
            "expires_at": grant.expires_at,
        }));
        fmt.success(&grant.instructions());

        if open {
            if let Err(e) = webbrowser::open(&grant.verification_uri) {
                warn!(error = %e, "Failed to open browser");
                fmt.warn("Could not open a browser; open the URL above manually");
            }
        }

        // Step 3-4: Wait and persist
        fmt.info("Waiting for sign-in to complete...");
        let principal = auth
            .complete_interactive_auth(&grant)
            .await
            .context("Sign-in did not complete")?;

        info!(principal = %principal.id(), "Login complete");
        fmt.success(&format!(
            "Authenticated as {} ({})",
            principal.display_name(),
            principal.id()
        ));
        Ok(())
    }

    async fn execute_list(
        &self,
        ctx: &AppContext,
        format: OutputFormat,
        fmt: &dyn OutputFormatter,
    ) -> Result<()> {
        let store = ctx.open_store().await?;
        let principals = store.list().await.context("Failed to list principals")?;

        if format == OutputFormat::Json {
            let rows: Vec<_> = principals
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id(),
                        "display_name": p.display_name(),
                        "token_expires_at": p.tokens().expires_at,
                        "has_refresh_token": p.tokens().refresh_token.is_some(),
                    })
                })
                .collect();
            fmt.print_json(&serde_json::Value::Array(rows));
            return Ok(());
        }

        if principals.is_empty() {
            fmt.info("No principals. Run 'drivemirror auth login' to add one.");
            return Ok(());
        }

        fmt.success(&format!(
            "{} principal{}",
            principals.len(),
            crate::output::plural(principals.len())
        ));
        let now = Utc::now();
        for p in &principals {
            let expiry = if p.tokens().expires_at <= now {
                "token expired".to_string()
            } else {
                format!("token valid until {}", p.tokens().expires_at.format("%Y-%m-%d %H:%M UTC"))
            };
            fmt.info(&format!("{:<32} {:<24} {}", p.id().as_str(), p.display_name(), expiry));
        }
        Ok(())
    }
}
