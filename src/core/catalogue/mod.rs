//! Catalogue Store: a single-file SQLite database holding labelled
//! entries (series/season/episode plus four text variants, four CTPH
//! hashes, and an optional embedding) with filtered scan and approximate
//! nearest-neighbour-by-embedding operations.
//!
//! Structured the way the pack's SQLite-backed catalog wraps a
//! `Mutex<Connection>` and runs its schema through `execute_batch` on
//! open; unlike that catalog this store has no foreign-key-linked child
//! tables, just one table plus a schema-version marker table.

mod schema;

use std::cmp::Ordering;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::core::embedding::{cosine_similarity, from_blob, to_blob};
use crate::error::{EpidError, EpidResult};

/// One normalized text variant plus its CTPH fingerprint, as stored for
/// each of the four variants an entry carries.
#[derive(Debug, Clone)]
pub struct VariantFingerprint {
    pub text: String,
    pub hash: String,
}

/// A row to be stored: a known label plus its four variants/hashes and an
/// optional embedding.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub series: String,
    pub season: String,
    pub episode: String,
    pub episode_name: Option<String>,
    pub original: VariantFingerprint,
    pub no_timecodes: VariantFingerprint,
    pub no_html: VariantFingerprint,
    pub clean: VariantFingerprint,
    pub embedding: Option<Vec<f32>>,
}

/// A stored catalogue entry, as returned by scan/nearest-neighbour queries.
#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub series: String,
    pub season: String,
    pub episode: String,
    pub episode_name: Option<String>,
    pub original: VariantFingerprint,
    pub no_timecodes: VariantFingerprint,
    pub no_html: VariantFingerprint,
    pub clean: VariantFingerprint,
    pub embedding: Option<Vec<f32>>,
}

/// An optional series/season filter for [`CatalogueStore::scan`].
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    pub series: Option<String>,
    pub season: Option<String>,
}

/// One nearest-neighbour hit: the entry plus its cosine similarity to the query.
#[derive(Debug, Clone)]
pub struct NearestHit {
    pub entry: Entry,
    pub similarity: f32,
}

/// Aggregate catalogue statistics.
#[derive(Debug, Clone)]
pub struct Stats {
    pub count: i64,
    pub dimension: usize,
    pub entries_with_embedding: i64,
}

/// The single-file SQLite-backed catalogue. Thread-safe for reads; writes
/// are serialized through the internal connection mutex.
pub struct CatalogueStore {
    conn: Mutex<Connection>,
}

impl CatalogueStore {
    /// Open (creating if absent) the catalogue database at `path`, running
    /// schema migrations as needed.
    pub fn open(path: &Path) -> EpidResult<Self> {
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory catalogue, for tests.
    pub fn in_memory() -> EpidResult<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new labelled entry. A true duplicate — an existing row
    /// whose `clean_hash` is bit-identical to `entry.clean.hash` — is
    /// suppressed: the existing row's id is returned and the catalogue is
    /// left unchanged, so storing the same entry twice is a no-op.
    pub fn store(&self, entry: &NewEntry) -> EpidResult<i64> {
        let conn = self.conn.lock().expect("catalogue connection lock poisoned");

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM labelled_entries WHERE clean_hash = ?1",
                params![entry.clean.hash],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }

        let embedding_blob = entry.embedding.as_ref().map(|v| to_blob(v));

        conn.execute(
            "INSERT INTO labelled_entries (
                series, season, episode, episode_name,
                original_text, no_timecodes_text, no_html_text, clean_text,
                original_hash, no_timecodes_hash, no_html_hash, clean_hash,
                embedding
            ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13)",
            params![
                entry.series,
                entry.season,
                entry.episode,
                entry.episode_name,
                entry.original.text,
                entry.no_timecodes.text,
                entry.no_html.text,
                entry.clean.text,
                entry.original.hash,
                entry.no_timecodes.hash,
                entry.no_html.hash,
                entry.clean.hash,
                embedding_blob,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Return all rows matching an optional case-insensitive series filter
    /// and an optional season filter. A season filter without a series
    /// filter is an [`EpidError::InvalidInput`]. Season strings match both
    /// zero-padded and bare integer representations.
    pub fn scan(&self, filter: &ScanFilter) -> EpidResult<Vec<Entry>> {
        if filter.season.is_some() && filter.series.is_none() {
            return Err(EpidError::invalid_input(
                "season filter requires a series filter",
            ));
        }

        let conn = self.conn.lock().expect("catalogue connection lock poisoned");
        let mut sql = String::from("SELECT * FROM labelled_entries WHERE 1=1");
        if filter.series.is_some() {
            sql.push_str(" AND lower(series) = lower(?1)");
        }
        let mut stmt = conn.prepare(&sql)?;

        let rows = if let Some(series) = &filter.series {
            stmt.query_map(params![series], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map([], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(match &filter.season {
            None => rows,
            Some(season) => {
                let bare = season.trim_start_matches('0');
                let bare = if bare.is_empty() { "0" } else { bare };
                rows.into_iter()
                    .filter(|e| e.season == *season || e.season.trim_start_matches('0') == bare)
                    .collect()
            }
        })
    }

    /// Return up to `k` rows with cosine similarity to `query` at least
    /// `min_similarity`, ordered by similarity descending, ties broken by
    /// (series, season, episode) ascending. Uses an in-memory top-K scan:
    /// no ANN extension is bundled with the store's dependency stack, so
    /// this is the store's only search path rather than a degraded one.
    pub fn nearest_by_embedding(
        &self,
        query: &[f32],
        k: usize,
        min_similarity: f32,
        series: Option<&str>,
        season: Option<&str>,
    ) -> EpidResult<Vec<NearestHit>> {
        let filter = ScanFilter {
            series: series.map(str::to_string),
            season: season.map(str::to_string),
        };
        let candidates = self.scan(&filter)?;

        let mut hits: Vec<NearestHit> = candidates
            .into_iter()
            .filter_map(|entry| {
                let embedding = entry.embedding.as_ref()?;
                let similarity = cosine_similarity(query, embedding);
                (similarity >= min_similarity).then_some(NearestHit { entry, similarity })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.entry.series.cmp(&b.entry.series))
                .then_with(|| a.entry.season.cmp(&b.entry.season))
                .then_with(|| a.entry.episode.cmp(&b.entry.episode))
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Regenerate the search index. With no ANN extension present there is
    /// no persistent index to rebuild; this is a no-op kept for interface
    /// parity and as the extension point a future vector-search backend
    /// would hook into.
    pub fn rebuild_index(&self) -> EpidResult<()> {
        Ok(())
    }

    /// Aggregate statistics: row count, embedding dimensionality, and how
    /// many rows already carry an embedding.
    pub fn stats(&self) -> EpidResult<Stats> {
        let conn = self.conn.lock().expect("catalogue connection lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM labelled_entries", [], |r| r.get(0))?;
        let with_embedding: i64 = conn.query_row(
            "SELECT COUNT(*) FROM labelled_entries WHERE embedding IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        Ok(Stats {
            count,
            dimension: crate::core::embedding::EMBEDDING_DIM,
            entries_with_embedding: with_embedding,
        })
    }

    /// Return up to `limit` entries lacking an embedding, for the
    /// migrator's backfill loop.
    pub fn entries_missing_embedding(&self, limit: usize) -> EpidResult<Vec<Entry>> {
        let conn = self.conn.lock().expect("catalogue connection lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT * FROM labelled_entries WHERE embedding IS NULL ORDER BY id LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], row_to_entry)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Write back a computed embedding for an existing row, used by the migrator.
    pub fn set_embedding(&self, id: i64, embedding: &[f32]) -> EpidResult<()> {
        let conn = self.conn.lock().expect("catalogue connection lock poisoned");
        conn.execute(
            "UPDATE labelled_entries SET embedding = ?1 WHERE id = ?2",
            params![to_blob(embedding), id],
        )?;
        Ok(())
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<Entry> {
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    let embedding = embedding_blob.and_then(|b| from_blob(&b).ok());
    Ok(Entry {
        id: row.get("id")?,
        series: row.get("series")?,
        season: row.get("season")?,
        episode: row.get("episode")?,
        episode_name: row.get("episode_name")?,
        original: VariantFingerprint {
            text: row.get("original_text")?,
            hash: row.get("original_hash")?,
        },
        no_timecodes: VariantFingerprint {
            text: row.get("no_timecodes_text")?,
            hash: row.get("no_timecodes_hash")?,
        },
        no_html: VariantFingerprint {
            text: row.get("no_html_text")?,
            hash: row.get("no_html_hash")?,
        },
        clean: VariantFingerprint {
            text: row.get("clean_text")?,
            hash: row.get("clean_hash")?,
        },
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(series: &str, season: &str, episode: &str, clean_hash: &str) -> NewEntry {
        NewEntry {
            series: series.to_string(),
            season: season.to_string(),
            episode: episode.to_string(),
            episode_name: None,
            original: VariantFingerprint { text: "raw".into(), hash: "3:a:a".into() },
            no_timecodes: VariantFingerprint { text: "raw".into(), hash: "3:a:a".into() },
            no_html: VariantFingerprint { text: "raw".into(), hash: "3:a:a".into() },
            clean: VariantFingerprint { text: "clean text".into(), hash: clean_hash.into() },
            embedding: None,
        }
    }

    #[test]
    fn store_then_scan_round_trips_an_entry() {
        let store = CatalogueStore::in_memory().unwrap();
        store.store(&sample_entry("Example Show", "01", "02", "3:xyz:x")).unwrap();

        let rows = store
            .scan(&ScanFilter { series: Some("example show".into()), season: None })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].episode, "02");
    }

    #[test]
    fn storing_a_duplicate_clean_hash_is_a_no_op() {
        let store = CatalogueStore::in_memory().unwrap();
        let first_id = store.store(&sample_entry("Show", "01", "01", "3:dup:d")).unwrap();
        let second_id = store.store(&sample_entry("Show", "01", "02", "3:dup:d")).unwrap();
        assert_eq!(first_id, second_id);
        assert_eq!(store.stats().unwrap().count, 1);
    }

    #[test]
    fn season_filter_without_series_filter_is_invalid() {
        let store = CatalogueStore::in_memory().unwrap();
        let err = store
            .scan(&ScanFilter { series: None, season: Some("01".into()) })
            .unwrap_err();
        assert!(matches!(err, EpidError::InvalidInput(_)));
    }

    #[test]
    fn season_filter_matches_zero_padded_and_bare_forms() {
        let store = CatalogueStore::in_memory().unwrap();
        store.store(&sample_entry("Show", "1", "01", "3:a:a")).unwrap();

        let rows = store
            .scan(&ScanFilter { series: Some("Show".into()), season: Some("01".into()) })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn nearest_by_embedding_orders_by_similarity_descending() {
        let store = CatalogueStore::in_memory().unwrap();
        let mut a = sample_entry("Show", "01", "01", "3:a:a");
        a.embedding = Some(vec![1.0, 0.0, 0.0]);
        let mut b = sample_entry("Show", "01", "02", "3:b:b");
        b.embedding = Some(vec![0.9, 0.1, 0.0]);
        store.store(&a).unwrap();
        store.store(&b).unwrap();

        let hits = store
            .nearest_by_embedding(&[1.0, 0.0, 0.0], 10, 0.0, None, None)
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].entry.episode, "01");
        assert!(hits[0].similarity >= hits[1].similarity);
    }

    #[test]
    fn stats_reports_count_and_embedded_count() {
        let store = CatalogueStore::in_memory().unwrap();
        store.store(&sample_entry("Show", "01", "01", "3:a:a")).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.entries_with_embedding, 0);
    }
}
