//! `migrate-embeddings` command: backfill embeddings for catalogue
//! entries that do not have one yet, then rebuild the nearest-neighbour
//! index.

use std::time::Instant;

use crate::cli::{self, MigrateEmbeddingsArgs};
use crate::config::Config;
use crate::core::catalogue::CatalogueStore;
use crate::core::embedding::EmbeddingEncoder;
use crate::core::migrator::Migrator;
use crate::error::EpidResult;

pub async fn execute(args: MigrateEmbeddingsArgs, config: &Config) -> EpidResult<i32> {
    let hash_db = args.hash_db.unwrap_or_else(cli::default_hash_db_path);
    let catalogue = CatalogueStore::open(&hash_db)?;
    let embedding = EmbeddingEncoder::new()?;
    let migrator = Migrator::new(&catalogue, &embedding, args.batch_size, config.ranker_enabled);

    let started = Instant::now();
    let summary = migrator
        .run(started, |done| eprintln!("migrate-embeddings: {done} entries processed so far"))
        .await?;

    eprintln!(
        "migrate-embeddings: total={} processed={} failed={} elapsed_ms={}",
        summary.total, summary.processed, summary.failed, summary.elapsed_ms
    );

    let stats = catalogue.stats()?;
    eprintln!(
        "catalogue now holds {} entries ({} with an embedding, dimension {})",
        stats.count, stats.entries_with_embedding, stats.dimension
    );

    println!(
        "{}",
        serde_json::json!({
            "status": if summary.failed == 0 { "ok" } else { "error" },
            "total": summary.total,
            "processed": summary.processed,
            "failed": summary.failed,
        })
    );

    Ok(if summary.failed == 0 { 0 } else { 1 })
}
