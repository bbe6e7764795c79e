//! Shell completions
//!
//! Usage: `drivemirror completions bash > ~/.local/share/bash-completion/completions/drivemirror`

use std::io;

use anyhow::Result;
use clap::CommandFactory;
use clap_complete::Shell;

#[derive(Debug, clap::Args)]
pub struct CompletionsCommand {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsCommand {
    /// Writes the completion script for the chosen shell to stdout
    pub fn execute(&self) -> Result<()> {
        let mut cmd = crate::Cli::command();
        let bin = cmd.get_name().to_string();
        clap_complete::generate(self.shell, &mut cmd, bin, &mut io::stdout());
        Ok(())
    }
}
