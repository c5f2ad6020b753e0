//! Orchestrator (§4.11).
//!
//! Wires the pipeline a single `identify` invocation runs end to end:
//! Acquirer → Normalizer (folded into the Acquirer's return value) →
//! optional Ranker → Matcher → optional Rename. Mirrors the shape of the
//! pack's match command, which resolves a video, extracts subtitle text,
//! scores it against a catalogue, and conditionally renames — generalized
//! here to the multi-format acquisition ladder and CTPH/embedding scoring
//! this crate adds.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;

use crate::config::{Config, MatchStrategy};
use crate::core::acquirer::Acquirer;
use crate::core::catalogue::{CatalogueStore, ScanFilter};
use crate::core::embedding::EmbeddingEncoder;
use crate::core::matcher::{MatchOutcome, Matcher};
use crate::core::ranker::{self, RankerConfig};
use crate::core::rename;
use crate::error::{EpidError, EpidResult};

/// Filters narrowing the catalogue search, as supplied on the CLI.
#[derive(Debug, Clone, Default)]
pub struct IdentifyFilter {
    pub series: Option<String>,
    pub season: Option<String>,
}

impl IdentifyFilter {
    /// A season filter without a series filter is ambiguous (which
    /// series' season 1?) and is rejected rather than silently scanning
    /// every series' matching season.
    pub fn validate(&self) -> EpidResult<()> {
        if self.season.is_some() && self.series.is_none() {
            return Err(EpidError::invalid_input(
                "--season requires --series to also be set",
            ));
        }
        Ok(())
    }
}

/// Full result of one orchestrated identification.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub match_outcome: MatchOutcome,
    /// The filename the rename template would produce, set whenever the
    /// match crossed the rename threshold (§3) regardless of whether a
    /// rename was actually requested.
    pub proposed_filename: Option<String>,
    /// Set only when a rename was requested *and* performed.
    pub renamed_to: Option<PathBuf>,
}

/// Runs the full pipeline for a single video.
pub struct Orchestrator<'a> {
    acquirer: &'a Acquirer,
    catalogue: &'a CatalogueStore,
    embedding: &'a EmbeddingEncoder,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        acquirer: &'a Acquirer,
        catalogue: &'a CatalogueStore,
        embedding: &'a EmbeddingEncoder,
    ) -> Self {
        Self {
            acquirer,
            catalogue,
            embedding,
        }
    }

    /// Identify `video`, optionally renaming it in place when the match
    /// crosses the configured rename threshold and `rename` is requested.
    ///
    /// `cancellation` is threaded into the acquirer so a caller-initiated
    /// cancellation (Ctrl-C, bulk-driver shutdown, §5) tears down any
    /// running extraction subprocess instead of waiting out its timeout.
    pub async fn identify(
        &self,
        video: &Path,
        language: Option<&str>,
        filter: IdentifyFilter,
        config: &Config,
        rename_requested: bool,
        cancellation: &CancellationToken,
    ) -> EpidResult<Outcome> {
        filter.validate()?;
        let acquired = self
            .acquirer
            .acquire(video, language, cancellation)
            .await?;
        let thresholds = config.thresholds_for(acquired.source_format);

        let embedding_text = match config.strategy {
            MatchStrategy::Hash => String::new(),
            MatchStrategy::Embedding | MatchStrategy::Hybrid if config.ranker_enabled => {
                ranker::rank(&acquired.normalized.clean, &RankerConfig::default())
            }
            MatchStrategy::Embedding | MatchStrategy::Hybrid => acquired.normalized.clean.clone(),
        };

        let matcher = Matcher::new(self.catalogue, self.embedding);
        let match_outcome = matcher
            .identify(
                &acquired.normalized,
                &embedding_text,
                acquired.source_format,
                config.strategy,
                thresholds,
                ScanFilter {
                    series: filter.series.clone(),
                    season: filter.season.clone(),
                },
            )
            .await?;

        let proposed_filename = match &match_outcome {
            MatchOutcome::Identified {
                result,
                rename_eligible: true,
            } => {
                let extension = video
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default();
                Some(rename::build_filename(
                    &config.rename_template,
                    &result.series,
                    &result.season,
                    &result.episode,
                    result.episode_name.as_deref(),
                    extension,
                    rename::DEFAULT_MAX_FILENAME_LEN,
                ))
            }
            _ => None,
        };

        let renamed_to = match &proposed_filename {
            Some(filename) if rename_requested => Some(rename::rename(video, filename)?),
            _ => None,
        };

        Ok(Outcome {
            match_outcome,
            proposed_filename,
            renamed_to,
        })
    }
}

/// Maps a [`MatchOutcome`] to the exit-relevant question: did identification
/// itself succeed, separate from whether a rename was also performed.
pub fn identification_failed(outcome: &MatchOutcome) -> Option<EpidError> {
    match outcome {
        MatchOutcome::Identified { .. } => None,
        MatchOutcome::NoMatch { .. } => Some(EpidError::NoMatch),
        MatchOutcome::Ambiguous { .. } => Some(EpidError::Ambiguous),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::Candidate;

    fn candidate() -> Candidate {
        Candidate {
            series: "Show".to_string(),
            season: "01".to_string(),
            episode: "01".to_string(),
            episode_name: None,
            confidence: 0.95,
        }
    }

    #[test]
    fn season_filter_without_series_is_rejected() {
        let filter = IdentifyFilter {
            series: None,
            season: Some("01".to_string()),
        };
        assert!(matches!(
            filter.validate(),
            Err(EpidError::InvalidInput(_))
        ));
    }

    #[test]
    fn series_filter_alone_is_fine() {
        let filter = IdentifyFilter {
            series: Some("Bones".to_string()),
            season: None,
        };
        assert!(filter.validate().is_ok());
    }

    #[test]
    fn identified_outcome_is_not_a_failure() {
        let outcome = MatchOutcome::Identified {
            result: candidate(),
            rename_eligible: true,
        };
        assert!(identification_failed(&outcome).is_none());
    }

    #[test]
    fn no_match_maps_to_no_match_error() {
        let outcome = MatchOutcome::NoMatch {
            ambiguity: Vec::new(),
        };
        assert!(matches!(
            identification_failed(&outcome),
            Some(EpidError::NoMatch)
        ));
    }

    #[test]
    fn ambiguous_maps_to_ambiguous_error() {
        let outcome = MatchOutcome::Ambiguous {
            top: candidate(),
            ambiguity: vec![candidate()],
        };
        assert!(matches!(
            identification_failed(&outcome),
            Some(EpidError::Ambiguous)
        ));
    }
}
