//! Embedding Migrator (§4.12).
//!
//! Backfills embeddings for catalogue entries stored before the
//! embedding encoder was available (or stored under `Hash`-only
//! strategy), batching through the encoder and rebuilding the in-memory
//! nearest-neighbour index once at the end. Resumable: a row already
//! carrying an embedding is never revisited, so a migration interrupted
//! partway through picks up where it left off on the next run.

use std::time::Instant;

use crate::core::catalogue::CatalogueStore;
use crate::core::embedding::EmbeddingEncoder;
use crate::core::ranker::{self, RankerConfig};
use crate::error::EpidResult;

/// Summary of one migration run.
#[derive(Debug, Clone, Copy)]
pub struct MigrationSummary {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub elapsed_ms: u128,
}

/// Drives the backfill in fixed-size batches.
pub struct Migrator<'a> {
    catalogue: &'a CatalogueStore,
    embedding: &'a EmbeddingEncoder,
    batch_size: usize,
    ranker_enabled: bool,
}

impl<'a> Migrator<'a> {
    /// `ranker_enabled` must match the live Configuration Snapshot's
    /// setting so a migrated embedding is comparable to the embeddings
    /// computed for queries under the same setting (§4.4's Open Question
    /// on ranker-vs-full-Clean embedding input).
    pub fn new(
        catalogue: &'a CatalogueStore,
        embedding: &'a EmbeddingEncoder,
        batch_size: usize,
        ranker_enabled: bool,
    ) -> Self {
        Self {
            catalogue,
            embedding,
            batch_size: batch_size.max(1),
            ranker_enabled,
        }
    }

    /// Run the migration to completion, reporting progress through
    /// `on_batch` after each batch (count processed so far, count
    /// remaining when known).
    pub async fn run(&self, started: Instant, mut on_batch: impl FnMut(usize)) -> EpidResult<MigrationSummary> {
        let mut processed = 0usize;
        let mut failed = 0usize;

        loop {
            let batch = self.catalogue.entries_missing_embedding(self.batch_size)?;
            if batch.is_empty() {
                break;
            }

            for entry in &batch {
                let text = if self.ranker_enabled {
                    ranker::rank(&entry.clean.text, &RankerConfig::default())
                } else {
                    entry.clean.text.clone()
                };
                match self.embedding.encode(&text).await {
                    Ok(vector) => {
                        self.catalogue.set_embedding(entry.id, &vector)?;
                        processed += 1;
                    }
                    Err(_) => failed += 1,
                }
            }

            on_batch(processed + failed);
        }

        self.catalogue.rebuild_index()?;

        Ok(MigrationSummary {
            total: processed + failed,
            processed,
            failed,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::{NewEntry, VariantFingerprint};
    use crate::core::ctph;

    fn variant(text: &str) -> VariantFingerprint {
        VariantFingerprint {
            hash: ctph::hash(text.as_bytes()),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn run_is_a_no_op_summary_when_every_entry_already_has_an_embedding() {
        let store = CatalogueStore::in_memory().unwrap();
        store
            .store(&NewEntry {
                series: "Show".to_string(),
                season: "01".to_string(),
                episode: "02".to_string(),
                episode_name: None,
                original: variant("hello world two"),
                no_timecodes: variant("hello world two"),
                no_html: variant("hello world two"),
                clean: variant("hello world two"),
                embedding: Some(vec![0.1; crate::core::embedding::EMBEDDING_DIM]),
            })
            .unwrap();

        let encoder = EmbeddingEncoder::with_models_dir(std::env::temp_dir());
        let migrator = Migrator::new(&store, &encoder, 10, true);
        let mut batches_seen = 0usize;
        let summary = migrator
            .run(Instant::now(), |_| batches_seen += 1)
            .await
            .unwrap();

        assert_eq!(summary.total, 0);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(batches_seen, 0);
    }

    #[tokio::test]
    async fn run_records_encode_failures_without_writing_an_embedding() {
        // With no reachable model cache, encoding fails and the migrator
        // must record the row as failed rather than panicking or silently
        // marking it processed.
        let store = CatalogueStore::in_memory().unwrap();
        store
            .store(&NewEntry {
                series: "Show".to_string(),
                season: "01".to_string(),
                episode: "01".to_string(),
                episode_name: None,
                original: variant("hello world one"),
                no_timecodes: variant("hello world one"),
                no_html: variant("hello world one"),
                clean: variant("hello world one"),
                embedding: None,
            })
            .unwrap();

        let encoder = EmbeddingEncoder::with_models_dir(std::env::temp_dir().join("epid-test-no-model"));
        let migrator = Migrator::new(&store, &encoder, 10, true);
        let summary = migrator.run(Instant::now(), |_| {}).await.unwrap();

        assert_eq!(summary.total, 1);
        assert_eq!(summary.processed + summary.failed, 1);
        if summary.processed == 0 {
            let remaining = store.entries_missing_embedding(10).unwrap();
            assert_eq!(remaining.len(), 1);
        }
    }
}
