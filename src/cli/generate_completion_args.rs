//! Command-line arguments for the `generate-completion` subcommand.

use clap::Args;
use clap_complete::Shell;

/// Generate a shell completion script for the given shell.
#[derive(Args, Debug)]
pub struct GenerateCompletionArgs {
    /// Shell to generate a completion script for.
    #[arg(value_enum)]
    pub shell: Shell,
}
