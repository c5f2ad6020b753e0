//! Command-line arguments for the `migrate-embeddings` subcommand.

use std::path::PathBuf;

use clap::Args;

/// Backfill embeddings for catalogue entries that do not have one yet.
#[derive(Args, Debug)]
pub struct MigrateEmbeddingsArgs {
    /// Catalogue database file.
    #[arg(long, value_name = "PATH")]
    pub hash_db: Option<PathBuf>,

    /// Number of entries encoded per batch.
    #[arg(long, default_value = "32", value_name = "N")]
    pub batch_size: usize,
}
