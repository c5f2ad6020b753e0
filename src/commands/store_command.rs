//! `store` command: label a subtitle file and add it to the catalogue.

use crate::cli::{self, StoreArgs};
use crate::commands::envelope::Envelope;
use crate::core::catalogue::{CatalogueStore, NewEntry, VariantFingerprint};
use crate::core::ctph;
use crate::core::normalizer;
use crate::error::EpidResult;

pub async fn execute(args: StoreArgs) -> EpidResult<i32> {
    let hash_db = args.hash_db.unwrap_or_else(cli::default_hash_db_path);
    let raw = std::fs::read_to_string(&args.input)?;
    let normalized = normalizer::normalize(&raw);

    if normalized.is_empty() {
        Envelope::from_error(&crate::error::EpidError::NoUsableSubtitles).print();
        return Ok(1);
    }

    let entry = NewEntry {
        series: args.series.clone(),
        season: args.season.clone(),
        episode: args.episode.clone(),
        episode_name: args.episode_name.clone(),
        original: VariantFingerprint {
            hash: ctph::hash(normalized.original.as_bytes()),
            text: normalized.original,
        },
        no_timecodes: VariantFingerprint {
            hash: ctph::hash(normalized.no_timecodes.as_bytes()),
            text: normalized.no_timecodes,
        },
        no_html: VariantFingerprint {
            hash: ctph::hash(normalized.no_html.as_bytes()),
            text: normalized.no_html,
        },
        clean: VariantFingerprint {
            hash: ctph::hash(normalized.clean.as_bytes()),
            text: normalized.clean,
        },
        embedding: None,
    };

    let store = CatalogueStore::open(&hash_db)?;
    store.store(&entry)?;

    let stats = store.stats()?;
    eprintln!(
        "catalogue now holds {} entries ({} with an embedding, dimension {})",
        stats.count, stats.entries_with_embedding, stats.dimension
    );

    let mut envelope = Envelope::ok();
    envelope.series = Some(args.series);
    envelope.season = Some(args.season);
    envelope.episode = Some(args.episode);
    envelope.episode_name = args.episode_name;
    envelope.print();
    Ok(0)
}
