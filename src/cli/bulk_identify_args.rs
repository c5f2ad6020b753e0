//! Command-line arguments for the `bulk-identify` subcommand.

use std::path::PathBuf;

use clap::Args;

/// Identify every video discovered under a directory.
#[derive(Args, Debug)]
pub struct BulkIdentifyArgs {
    /// Directory to scan for video files.
    #[arg(long, value_name = "DIR")]
    pub bulk_identify: PathBuf,

    /// Recurse into subdirectories.
    #[arg(long)]
    pub recursive: bool,

    /// Rename identified files in place when confidence allows it.
    #[arg(long)]
    pub rename: bool,

    /// Catalogue database file.
    #[arg(long, value_name = "PATH")]
    pub hash_db: Option<PathBuf>,
}
