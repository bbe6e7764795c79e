//! Config command - View and check the drivemirror configuration
//!
//! Provides the `drivemirror config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Validates the configuration file and reports errors

use anyhow::{Context, Result};
use clap::Subcommand;
use drivemirror_core::config::{Config, ValidationError};
use tracing::info;

use super::AppContext;
use crate::output::{get_formatter, plural, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx, format),
            ConfigCommand::Validate => self.execute_validate(ctx, format),
        }
    }

    fn execute_show(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        let shown = redacted(&ctx.config);
        if format == OutputFormat::Json {
            let json = serde_json::to_value(&shown)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&shown)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &AppContext, format: OutputFormat) -> Result<()> {
        let formatter = get_formatter(format == OutputFormat::Json);
        let path = &ctx.config_path;

        // Load the file itself; a parse error must not fall back to defaults
        let config = match Config::load(path) {
            Ok(cfg) => cfg,
            Err(_) if !path.exists() => {
                if format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": ["Configuration file not found. Using defaults."],
                    }));
                } else {
                    formatter.info(&format!("Configuration file not found at {}", path.display()));
                    formatter.info("Using the default configuration.");
                }
                return Ok(());
            }
            Err(e) => {
                if format == OutputFormat::Json {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse {}: {e}", path.display()));
                }
                return Ok(());
            }
        };

        let errors = check(&config);
        if format == OutputFormat::Json {
            let error_strings: Vec<String> = errors.iter().map(ToString::to_string).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                plural(errors.len())
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }
}

/// Structural validation plus the settings a sync needs
fn check(config: &Config) -> Vec<ValidationError> {
    let mut errors = config.validate();
    if config.auth.client_id.is_none() {
        errors.push(ValidationError {
            field: "auth.client_id".to_string(),
            message: "must be set to sign in or sync".to_string(),
        });
    }
    errors
}

/// Copy of the configuration with the client secret masked
fn redacted(config: &Config) -> Config {
    let mut shown = config.clone();
    if shown.auth.client_secret.is_some() {
        shown.auth.client_secret = Some("********".to_string());
    }
    shown
}
