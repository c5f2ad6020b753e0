//! Command-line arguments for the `identify` subcommand.

use std::path::PathBuf;

use clap::Args;

/// Identify a single video against the catalogue.
#[derive(Args, Debug)]
pub struct IdentifyArgs {
    /// Video file to identify.
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Catalogue database file.
    #[arg(long, value_name = "PATH")]
    pub hash_db: Option<PathBuf>,

    /// Restrict the search to a known series.
    #[arg(long, value_name = "SERIES")]
    pub series: Option<String>,

    /// Restrict the search to a known season.
    #[arg(long, value_name = "N")]
    pub season: Option<String>,

    /// Rename the file in place when identification is confident enough.
    #[arg(long)]
    pub rename: bool,

    /// Preferred subtitle track language (ISO 639, e.g. `eng`).
    #[arg(long, value_name = "LANG")]
    pub language: Option<String>,
}
