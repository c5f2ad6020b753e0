//! Command-line interface for the episode identifier.
//!
//! The CLI is a thin `clap` shell around the five verbs the tool exposes:
//! `identify`, `store`, `bulk-identify`, `migrate-embeddings`, and
//! `generate-completion`. Every verb but the last prints one JSON object
//! to stdout (§7); diagnostics and progress go to stderr. `run` resolves
//! the catalogue path and dispatches to [`crate::commands`].

mod bulk_identify_args;
mod generate_completion_args;
mod identify_args;
mod migrate_embeddings_args;
mod store_args;

pub use bulk_identify_args::BulkIdentifyArgs;
pub use generate_completion_args::GenerateCompletionArgs;
pub use identify_args::IdentifyArgs;
pub use migrate_embeddings_args::MigrateEmbeddingsArgs;
pub use store_args::StoreArgs;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ConfigHandle;
use crate::error::EpidResult;

/// Episode identifier command-line application.
#[derive(Parser, Debug)]
#[command(name = "episode-identifier")]
#[command(about = "Identify TV episodes from their subtitle content")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Identify a single video against the catalogue.
    Identify(IdentifyArgs),

    /// Label a subtitle and add it to the catalogue.
    Store(StoreArgs),

    /// Identify every video discovered under a directory.
    BulkIdentify(BulkIdentifyArgs),

    /// Backfill embeddings for catalogue entries that lack one.
    MigrateEmbeddings(MigrateEmbeddingsArgs),

    /// Generate a shell completion script.
    GenerateCompletion(GenerateCompletionArgs),
}

/// Default catalogue database path, used when `--hash-db` is omitted.
pub fn default_hash_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("EPID_HASH_DB") {
        return PathBuf::from(path);
    }
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("episode-identifier")
        .join("catalogue.sqlite3")
}

/// Parse arguments and dispatch to the selected command, returning the
/// process exit code for this invocation (§6: 0 success, 1 identification
/// failure, 2 invalid arguments/configuration, 3 fatal environment error).
///
/// `config_handle` is the live Configuration Snapshot pointer published by
/// the running [`crate::config::manager::ConfigManager`]. Single-shot verbs
/// (`identify`, `store`, `migrate-embeddings`) dereference it once at the
/// start of the call, matching §4.9's "readers get a consistent snapshot
/// per call". `bulk-identify` keeps the live handle for the duration of the
/// run so hot-reload can change the effective concurrency of the next
/// batch (§4.8, §5) without ever interrupting in-flight work.
///
/// Environment/catalogue/extraction errors propagate as `Err`; the caller
/// maps those to an exit code via [`crate::error::EpidError::exit_code`].
pub async fn run(config_handle: &ConfigHandle) -> EpidResult<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Identify(args) => {
            let config = config_handle.load_full();
            crate::commands::identify_command::execute(args, &config).await
        }
        Commands::Store(args) => crate::commands::store_command::execute(args).await,
        Commands::BulkIdentify(args) => {
            crate::commands::bulk_identify_command::execute(args, config_handle.clone()).await
        }
        Commands::MigrateEmbeddings(args) => {
            let config = config_handle.load_full();
            crate::commands::migrate_embeddings_command::execute(args, &config).await
        }
        Commands::GenerateCompletion(args) => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
            Ok(0)
        }
    }
}
