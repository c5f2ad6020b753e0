//! Configuration management for the episode identifier.
//!
//! A [`Config`] is the typed, validated "Configuration Snapshot": per-format
//! thresholds, the matching strategy, the bulk concurrency bound, filename-
//! parsing patterns, and the rename template. It is loaded by layering a
//! JSON file, environment overrides, and CLI overrides (see [`source`]),
//! validated as a whole, and published behind an atomic pointer so that
//! hot-reload never exposes a partially-applied configuration (see
//! [`manager`]).

pub mod manager;
pub mod source;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::{EpidError, EpidResult};

/// A cheap, cloneable handle to the live Configuration Snapshot, as
/// published by [`manager::ConfigManager`]. Readers dereference it at the
/// point they need a consistent snapshot; nothing ever mutates the
/// [`Config`] it points to, hot-reload only ever swaps the pointer.
pub type ConfigHandle = Arc<ArcSwap<Config>>;

/// One of the three source formats a query or catalogue entry can come
/// from; determines which threshold set applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// Machine-readable text subtitle track.
    Text,
    /// Pre-rendered bitmap raster subtitle track.
    BitmapRaster,
    /// DVD `.idx`/`.sub` raster pair.
    DvdRaster,
}

impl SourceFormat {
    /// Stable identifier used as a config-file key and in log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::Text => "text",
            SourceFormat::BitmapRaster => "bitmap_raster",
            SourceFormat::DvdRaster => "dvd_raster",
        }
    }
}

/// The matching strategy selector (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// CTPH fuzzy-hash comparison only.
    Hash,
    /// Embedding cosine-similarity search only.
    Embedding,
    /// Embedding first, falling back to Hash below the match threshold.
    Hybrid,
}

/// Per-source-format confidence thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatThresholds {
    /// Minimum embedding cosine similarity to consider a candidate.
    pub embedding_similarity_floor: f32,
    /// Confidence at/above which a result is reported as identified.
    pub match_confidence: f32,
    /// Confidence at/above which a rename is proposed.
    pub rename_confidence: f32,
    /// Minimum CTPH similarity (already normalized to [0,1]) worth reporting.
    pub ctph_similarity_floor: f32,
}

impl FormatThresholds {
    fn validate(&self, format: SourceFormat, errors: &mut Vec<String>) {
        if !(0.0..=1.0).contains(&self.embedding_similarity_floor) {
            errors.push(format!(
                "{}: embedding_similarity_floor must be in [0,1]",
                format.as_str()
            ));
        }
        if !(0.0..=1.0).contains(&self.match_confidence) {
            errors.push(format!(
                "{}: match_confidence must be in [0,1]",
                format.as_str()
            ));
        }
        if !(0.0..=1.0).contains(&self.rename_confidence) {
            errors.push(format!(
                "{}: rename_confidence must be in [0,1]",
                format.as_str()
            ));
        }
        if self.match_confidence > self.rename_confidence {
            errors.push(format!(
                "{}: match_confidence must be <= rename_confidence",
                format.as_str()
            ));
        }
    }
}

fn default_thresholds() -> HashMap<SourceFormat, FormatThresholds> {
    let mut m = HashMap::new();
    m.insert(
        SourceFormat::Text,
        FormatThresholds {
            embedding_similarity_floor: 0.80,
            match_confidence: 0.60,
            rename_confidence: 0.90,
            ctph_similarity_floor: 0.50,
        },
    );
    m.insert(
        SourceFormat::BitmapRaster,
        FormatThresholds {
            embedding_similarity_floor: 0.75,
            match_confidence: 0.55,
            rename_confidence: 0.85,
            ctph_similarity_floor: 0.45,
        },
    );
    m.insert(
        SourceFormat::DvdRaster,
        FormatThresholds {
            embedding_similarity_floor: 0.70,
            match_confidence: 0.50,
            rename_confidence: 0.80,
            ctph_similarity_floor: 0.40,
        },
    );
    m
}

/// Filename-parsing pattern set: a primary regex with named groups
/// `SeriesName`, `Season`, `Episode`, plus optional fallbacks tried in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilenamePatterns {
    /// Primary regex, must contain the three named capture groups.
    pub primary: String,
    /// Additional patterns tried in order if the primary doesn't match.
    #[serde(default)]
    pub fallbacks: Vec<String>,
}

impl Default for FilenamePatterns {
    fn default() -> Self {
        Self {
            primary: r"(?P<SeriesName>.+?)[.\s_-]+[Ss](?P<Season>\d{1,2})[Ee](?P<Episode>\d{1,3})"
                .to_string(),
            fallbacks: vec![
                r"(?P<SeriesName>.+?)[.\s_-]+(?P<Season>\d{1,2})x(?P<Episode>\d{1,3})".to_string(),
            ],
        }
    }
}

/// The full Configuration Snapshot: immutable once loaded, replaced
/// atomically on hot-reload, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version of this configuration document.
    pub schema_version: String,
    /// Per-source-format thresholds.
    #[serde(default = "default_thresholds")]
    pub thresholds: HashMap<SourceFormat, FormatThresholds>,
    /// Matching strategy selector.
    pub strategy: MatchStrategy,
    /// Bulk-driver concurrency bound, before clamping.
    pub max_concurrency: i64,
    /// Filename-parsing patterns used by the Bulk Driver / Rename Service.
    pub filename_patterns: FilenamePatterns,
    /// Rename template; must contain `{SeriesName}`, `{Season}`, `{Episode}`.
    pub rename_template: String,
    /// Whether the Sentence Ranker (§4.2) filters Clean text before it
    /// reaches the embedding encoder. Disabled, the encoder sees the full
    /// Clean variant. Catalogues migrated with one setting should be
    /// re-migrated after flipping it, since the embedding a query is
    /// compared against was produced under whichever setting was active
    /// at migration time (see DESIGN.md's Open Questions).
    #[serde(default = "default_ranker_enabled")]
    pub ranker_enabled: bool,
    /// Path the configuration was loaded from, if any.
    #[serde(skip)]
    pub loaded_from: Option<std::path::PathBuf>,
}

fn default_ranker_enabled() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            thresholds: default_thresholds(),
            strategy: MatchStrategy::Hybrid,
            max_concurrency: num_cpus::get() as i64,
            filename_patterns: FilenamePatterns::default(),
            rename_template: "{SeriesName} - S{Season}E{Episode}".to_string(),
            ranker_enabled: default_ranker_enabled(),
            loaded_from: None,
        }
    }
}

impl Config {
    /// Thresholds for the given source format, falling back to the Text
    /// set if the map is missing an entry (defensive against a
    /// partially-specified config file that passed validation only because
    /// validation allows missing-format defaults to be filled in first).
    pub fn thresholds_for(&self, format: SourceFormat) -> &FormatThresholds {
        self.thresholds
            .get(&format)
            .unwrap_or_else(|| self.thresholds.get(&SourceFormat::Text).unwrap())
    }

    /// Effective bulk-driver worker count: `min(max(max_concurrency, 1), 100)`.
    pub fn effective_concurrency(&self) -> usize {
        self.max_concurrency.clamp(1, 100) as usize
    }

    /// Validate the whole snapshot, returning every problem found rather
    /// than failing on the first one — no partial applies.
    pub fn validate(&self) -> EpidResult<()> {
        let mut errors = Vec::new();

        if self.thresholds.is_empty() {
            errors.push("thresholds must not be empty".to_string());
        }
        for (format, t) in &self.thresholds {
            t.validate(*format, &mut errors);
        }

        for re in std::iter::once(&self.filename_patterns.primary)
            .chain(self.filename_patterns.fallbacks.iter())
        {
            match regex::Regex::new(re) {
                Ok(compiled) => {
                    for group in ["SeriesName", "Season", "Episode"] {
                        if compiled.capture_names().flatten().all(|n| n != group) {
                            errors.push(format!(
                                "filename pattern {re:?} is missing named group {group}"
                            ));
                        }
                    }
                }
                Err(e) => errors.push(format!("invalid filename pattern {re:?}: {e}")),
            }
        }

        for placeholder in ["{SeriesName}", "{Season}", "{Episode}"] {
            if !self.rename_template.contains(placeholder) {
                errors.push(format!(
                    "rename_template must contain {placeholder} placeholder"
                ));
            }
        }

        if !errors.is_empty() {
            return Err(EpidError::invalid_input(errors.join("; ")));
        }
        Ok(())
    }

    /// Clamp an out-of-range `max_concurrency`, logging a warning, per
    /// §4.9: non-integer/≤0 falls back to 1, >100 clamps to 100. A
    /// non-integer source value is coerced to `0` by
    /// [`super::source::coerce_max_concurrency`] before this type ever
    /// exists, so by the time this runs the value is always a plain
    /// integer and only the range clamp remains to apply.
    pub fn normalize_concurrency(&mut self) {
        let clamped = self.max_concurrency.clamp(1, 100);
        if clamped != self.max_concurrency {
            log::warn!(
                "max_concurrency {} out of range, clamped to {}",
                self.max_concurrency,
                clamped
            );
            self.max_concurrency = clamped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn match_above_rename_confidence_is_rejected() {
        let mut config = Config::default();
        config
            .thresholds
            .get_mut(&SourceFormat::Text)
            .unwrap()
            .match_confidence = 0.95;
        config
            .thresholds
            .get_mut(&SourceFormat::Text)
            .unwrap()
            .rename_confidence = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rename_template_without_placeholders_is_rejected() {
        let mut config = Config::default();
        config.rename_template = "no placeholders here".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_concurrency_clamps_to_bounds() {
        let mut config = Config::default();
        config.max_concurrency = 0;
        assert_eq!(config.effective_concurrency(), 1);
        config.max_concurrency = -5;
        assert_eq!(config.effective_concurrency(), 1);
        config.max_concurrency = 1000;
        assert_eq!(config.effective_concurrency(), 100);
    }

    #[test]
    fn filename_pattern_missing_named_group_is_rejected() {
        let mut config = Config::default();
        config.filename_patterns.primary = r"(?P<SeriesName>.+)".to_string();
        assert!(config.validate().is_err());
    }
}
