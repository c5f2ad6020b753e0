//! `bulk-identify` command: identify every discovered video under a
//! directory, bounded by the configured concurrency, and print a single
//! summary envelope.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::{self, BulkIdentifyArgs};
use crate::config::ConfigHandle;
use crate::core::acquirer::Acquirer;
use crate::core::bulk::{self, BulkDriver, Progress, Termination};
use crate::core::catalogue::CatalogueStore;
use crate::core::embedding::EmbeddingEncoder;
use crate::core::orchestrator::{IdentifyFilter, Orchestrator};
use crate::error::EpidResult;

const MAX_ERRORS: usize = 1000;

/// `config_handle` is kept live for the whole run: each dispatched file
/// reads the current snapshot at the moment it starts, and the driver
/// itself re-reads the concurrency bound at every batch boundary (§4.8).
pub async fn execute(args: BulkIdentifyArgs, config_handle: ConfigHandle) -> EpidResult<i32> {
    let hash_db = args.hash_db.unwrap_or_else(cli::default_hash_db_path);
    let catalogue = Arc::new(CatalogueStore::open(&hash_db)?);
    let embedding = Arc::new(EmbeddingEncoder::new()?);
    let acquirer = Arc::new(Acquirer::new());

    let files = bulk::discover(&args.bulk_identify, args.recursive, &[]);
    eprintln!("discovered {} candidate file(s)", files.len());

    let driver = BulkDriver::new(MAX_ERRORS);
    let cancellation = CancellationToken::new();
    let rename_requested = args.rename;
    let per_file_config_handle = Arc::clone(&config_handle);
    let per_file_cancellation = cancellation.clone();

    let ctrl_c_cancellation = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("interrupted, draining in-flight work...");
            ctrl_c_cancellation.cancel();
        }
    });

    let summary = driver
        .run(
            files,
            config_handle,
            cancellation,
            |progress: Progress| {
                eprintln!(
                    "progress: {}/{} complete",
                    progress.completed_so_far, progress.discovered_so_far
                );
            },
            move |path| {
                let catalogue = Arc::clone(&catalogue);
                let embedding = Arc::clone(&embedding);
                let acquirer = Arc::clone(&acquirer);
                let config = per_file_config_handle.load_full();
                let cancellation = per_file_cancellation.clone();
                async move {
                    let orchestrator = Orchestrator::new(&acquirer, &catalogue, &embedding);
                    orchestrator
                        .identify(
                            &path,
                            None,
                            IdentifyFilter::default(),
                            &config,
                            rename_requested,
                            &cancellation,
                        )
                        .await
                }
            },
        )
        .await;

    eprintln!(
        "bulk identify: discovered={} succeeded={} failed={} skipped={}",
        summary.discovered, summary.succeeded, summary.failed, summary.skipped
    );
    for (path, message) in summary.errors.entries() {
        eprintln!("  {}: {message}", path.display());
    }

    let exit_code = match summary.termination {
        Termination::Completed => 0,
        Termination::CompletedWithErrors | Termination::Cancelled => 1,
    };
    Ok(exit_code)
}
