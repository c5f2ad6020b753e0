//! Subtitle Acquirer.
//!
//! Drives the fixed Text → BitmapRaster → DvdRaster fallback ladder
//! described in §4.6: detect subtitle streams via the container demuxer,
//! pick the best track by language then index, extract into a per-
//! invocation scoped temp directory, OCR raster sources, normalize, and
//! stop at the first source yielding non-empty Clean text. Tool discovery
//! failures are fatal and validated up front; per-file extraction
//! failures are recoverable and simply advance the ladder, the same
//! separation the pack's ffmpeg wrapper draws between "tool not found"
//! and "this run failed".

mod extractors;
mod ffprobe;
mod process;

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use which::which;

use crate::config::SourceFormat;
use crate::core::language::LanguageDetector;
use crate::core::normalizer::{self, NormalizedVariants};
use crate::error::{EpidError, EpidResult};

use extractors::{BITMAP_CODECS, DVD_CODECS, ExtractOutcome, TEXT_CODECS};
use ffprobe::pick_best_track;

/// External tools the acquisition ladder depends on, resolved via `PATH`.
const REQUIRED_TOOLS: &[&str] = &["ffprobe", "ffmpeg", "pgsrip", "mkvextract", "vobsub2srt"];

/// Default per-source-format operation timeout (§5: defaults to 5 minutes).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Result of a successful acquisition: normalized text labelled with the
/// ladder level that produced it.
#[derive(Debug, Clone)]
pub struct AcquiredSubtitle {
    pub normalized: NormalizedVariants,
    pub source_format: SourceFormat,
}

/// Verify every external tool the acquirer depends on is resolvable on
/// `PATH`. Called once, early, so a missing tool is a fatal
/// [`EpidError::EnvironmentMissing`] rather than a per-file surprise.
pub fn validate_environment() -> EpidResult<()> {
    for tool in REQUIRED_TOOLS {
        which(tool).map_err(|_| {
            EpidError::environment_missing(format!("required tool {tool:?} not found on PATH"))
        })?;
    }
    Ok(())
}

/// Acquires subtitle text from a video by walking the fixed format ladder.
pub struct Acquirer {
    timeout: Duration,
    language_detector: LanguageDetector,
}

impl Acquirer {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            language_detector: LanguageDetector::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            language_detector: LanguageDetector::new(),
        }
    }

    /// Acquire normalized subtitle text from `video`, preferring
    /// `language` when multiple tracks are available. `language` falls
    /// back to a best-effort guess from the video's own path when absent.
    ///
    /// `cancellation` is checked at every suspension point the ladder
    /// crosses (§5): it propagates down to each child-process invocation,
    /// which is torn down with SIGTERM-then-SIGKILL rather than left
    /// running if it fires mid-extraction.
    pub async fn acquire(
        &self,
        video: &Path,
        language: Option<&str>,
        cancellation: &CancellationToken,
    ) -> EpidResult<AcquiredSubtitle> {
        let preferred_language = language
            .map(str::to_string)
            .or_else(|| self.language_detector.get_primary_language(video));

        let streams =
            ffprobe::list_subtitle_streams(video, self.timeout, cancellation).await?;

        for (source_format, codecs) in [
            (SourceFormat::Text, TEXT_CODECS),
            (SourceFormat::BitmapRaster, BITMAP_CODECS),
            (SourceFormat::DvdRaster, DVD_CODECS),
        ] {
            if cancellation.is_cancelled() {
                return Err(EpidError::Cancelled);
            }

            let Some(track) = pick_best_track(&streams, codecs, preferred_language.as_deref())
            else {
                continue;
            };

            let work_dir = tempfile::tempdir()
                .map_err(|e| EpidError::extraction_failed(format!("scratch dir: {e}")))?;

            let outcome = match source_format {
                SourceFormat::Text => {
                    extractors::extract_text(
                        video,
                        track.index,
                        work_dir.path(),
                        self.timeout,
                        cancellation,
                    )
                    .await?
                }
                SourceFormat::BitmapRaster => {
                    extractors::extract_bitmap(
                        video,
                        track.index,
                        work_dir.path(),
                        preferred_language.as_deref().unwrap_or("eng"),
                        self.timeout,
                        cancellation,
                    )
                    .await?
                }
                SourceFormat::DvdRaster => {
                    extractors::extract_dvd(
                        video,
                        track.index,
                        work_dir.path(),
                        preferred_language.as_deref().unwrap_or("eng"),
                        self.timeout,
                        cancellation,
                    )
                    .await?
                }
            };

            // work_dir is dropped (and its contents removed) at the end of
            // this iteration regardless of which branch below is taken.
            match outcome {
                ExtractOutcome::Text(raw) => {
                    let normalized = normalizer::normalize(&raw);
                    if !normalized.is_empty() {
                        return Ok(AcquiredSubtitle {
                            normalized,
                            source_format,
                        });
                    }
                }
                ExtractOutcome::NotPresent | ExtractOutcome::Failed(_) => {}
            }
        }

        Err(EpidError::NoUsableSubtitles)
    }
}

impl Default for Acquirer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_on_a_video_with_no_subtitle_streams_yields_no_usable_subtitles() {
        // ffprobe on a file with no subtitle streams (or that doesn't parse
        // as a container at all) returns an empty stream list, which the
        // ladder exhausts immediately.
        let acquirer = Acquirer::with_timeout(Duration::from_secs(2));
        let dir = tempfile::tempdir().unwrap();
        let fake_video = dir.path().join("not-really-a-video.mkv");
        std::fs::write(&fake_video, b"not a real container").unwrap();

        let result = acquirer
            .acquire(&fake_video, Some("eng"), &CancellationToken::new())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn acquire_respects_an_already_cancelled_token() {
        let acquirer = Acquirer::with_timeout(Duration::from_secs(2));
        let dir = tempfile::tempdir().unwrap();
        let fake_video = dir.path().join("not-really-a-video.mkv");
        std::fs::write(&fake_video, b"not a real container").unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result = acquirer.acquire(&fake_video, Some("eng"), &token).await;
        assert!(matches!(result, Err(EpidError::Cancelled)));
    }
}
