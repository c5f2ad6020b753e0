//! `identify` command: run the full pipeline against one video and print
//! its outcome as a single JSON object (§7).

use tokio_util::sync::CancellationToken;

use crate::cli::{self, IdentifyArgs};
use crate::commands::envelope::Envelope;
use crate::config::Config;
use crate::core::acquirer::Acquirer;
use crate::core::catalogue::CatalogueStore;
use crate::core::embedding::EmbeddingEncoder;
use crate::core::orchestrator::{self, IdentifyFilter, Orchestrator};
use crate::error::EpidResult;

/// Runs identification and prints its envelope. Returns the process exit
/// code for this invocation (0 = identified, 1 = no_match/ambiguous);
/// execution errors (environment, catalogue, extraction) propagate as
/// `Err` for the caller to render and map to their own exit code.
pub async fn execute(args: IdentifyArgs, config: &Config) -> EpidResult<i32> {
    let hash_db = args.hash_db.unwrap_or_else(cli::default_hash_db_path);
    let catalogue = CatalogueStore::open(&hash_db)?;
    let embedding = EmbeddingEncoder::new()?;
    let acquirer = Acquirer::new();
    let orchestrator = Orchestrator::new(&acquirer, &catalogue, &embedding);

    let filter = IdentifyFilter {
        series: args.series,
        season: args.season,
    };

    let cancellation = CancellationToken::new();
    let ctrl_c_cancellation = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancellation.cancel();
        }
    });

    let outcome = orchestrator
        .identify(
            &args.input,
            args.language.as_deref(),
            filter,
            config,
            args.rename,
            &cancellation,
        )
        .await?;

    let exit_code = if orchestrator::identification_failed(&outcome.match_outcome).is_some() {
        1
    } else {
        0
    };

    Envelope::from_outcome(&outcome).print();
    Ok(exit_code)
}
