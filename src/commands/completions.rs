use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory};
use clap_complete::Shell;

use crate::cli::Cli;

#[derive(Debug, Clone, Args)]
pub struct CompletionsCommand {
    #[arg(value_enum, help = "Shell to generate completions for")]
    pub shell: Shell,
}

impl CompletionsCommand {
    /// Write the completion script for every subcommand and session flag.
    pub fn write_to(&self, out: &mut impl Write) -> Result<()> {
        let mut cmd = Cli::command();
        let bin = cmd.get_name().to_string();
        clap_complete::generate(self.shell, &mut cmd, bin, out);
        out.flush().context("Failed to write completion script")
    }

    pub fn execute(self) -> Result<()> {
        self.write_to(&mut io::stdout().lock())
    }
}
