//! Command-line arguments for the `store` subcommand.

use std::path::PathBuf;

use clap::Args;

/// Label a subtitle with a known series/season/episode and add it to the
/// catalogue.
#[derive(Args, Debug)]
pub struct StoreArgs {
    /// Subtitle or video file to fingerprint and store.
    #[arg(long, value_name = "PATH")]
    pub input: PathBuf,

    /// Series name for the stored label.
    #[arg(long, value_name = "SERIES")]
    pub series: String,

    /// Season number for the stored label.
    #[arg(long, value_name = "N")]
    pub season: String,

    /// Episode number for the stored label.
    #[arg(long, value_name = "N")]
    pub episode: String,

    /// Optional episode title for the stored label.
    #[arg(long, value_name = "NAME")]
    pub episode_name: Option<String>,

    /// Catalogue database file.
    #[arg(long, value_name = "PATH")]
    pub hash_db: Option<PathBuf>,
}
