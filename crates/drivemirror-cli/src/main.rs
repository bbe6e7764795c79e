//! drivemirror - Mirror cloud drives to the local filesystem
//!
//! Provides commands for:
//! - Signing principals in with the device-code flow
//! - Running reconciliation cycles for one or all principals
//! - Viewing per-principal sync status
//! - Inspecting the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    auth::AuthCommand, completions::CompletionsCommand, config::ConfigCommand,
    status::StatusCommand, sync::SyncCommand, AppContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "drivemirror",
    version,
    about = "Mirror OneDrive accounts to local directories"
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Authentication commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Run a reconciliation cycle
    Sync(SyncCommand),
    /// Show synchronization status
    Status(StatusCommand),
    /// View configuration
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Generate shell completions
    Completions(CompletionsCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = AppContext::load(cli.config.as_deref());

    init_tracing(&cli, &ctx);

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match &cli.command {
        Commands::Auth(cmd) => cmd.execute(&ctx, format).await,
        Commands::Sync(cmd) => cmd.execute(&ctx, format).await,
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
        Commands::Completions(cmd) => cmd.execute(),
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
///
/// Precedence: `RUST_LOG`, then `-v`, then `logging.level` from the config.
fn init_tracing(cli: &Cli, ctx: &AppContext) {
    let level = match cli.verbose {
        0 => ctx.config.logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    if cli.log_json || ctx.config.logging.json {
        builder.json().with_current_span(true).init();
    } else {
        builder.with_target(false).init();
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_sync_requires_principal_or_all() {
        assert!(Cli::try_parse_from(["drivemirror", "sync"]).is_err());
        assert!(Cli::try_parse_from(["drivemirror", "sync", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["drivemirror", "sync", "alice@example.com"]).is_ok());
    }

    #[test]
    fn test_parallel_requires_all() {
        assert!(Cli::try_parse_from(["drivemirror", "sync", "a@example.com", "--parallel"]).is_err());
        assert!(Cli::try_parse_from(["drivemirror", "sync", "--all", "--parallel"]).is_ok());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["drivemirror", "status", "--json", "-vv"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }
}
