//! Container demuxer probing: lists subtitle streams via `ffprobe`'s JSON
//! output, the way the pack's ffmpeg wrapper parses `ffprobe -show_streams`
//! into typed structs rather than walking raw `serde_json::Value`.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::core::acquirer::process::run_with_timeout;
use crate::error::{EpidError, EpidResult};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    index: u32,
    #[serde(default)]
    codec_name: String,
    #[serde(default)]
    tags: ProbeTags,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    language: Option<String>,
}

/// One subtitle stream as reported by the demuxer.
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_name: String,
    pub language: Option<String>,
}

/// List subtitle streams in `video` via `ffprobe`. A tool-missing spawn
/// error surfaces as [`EpidError::EnvironmentMissing`]; a non-zero exit or
/// malformed JSON surfaces as [`EpidError::ExtractionFailed`], recoverable
/// by the acquisition ladder.
pub async fn list_subtitle_streams(
    video: &Path,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> EpidResult<Vec<StreamInfo>> {
    let output = run_with_timeout(
        "ffprobe",
        &[
            "-v".to_string(),
            "quiet".to_string(),
            "-print_format".to_string(),
            "json".to_string(),
            "-show_streams".to_string(),
            "-select_streams".to_string(),
            "s".to_string(),
            video.to_string_lossy().into_owned(),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !output.status.success() {
        return Err(EpidError::extraction_failed(format!(
            "ffprobe exited with {:?}: {}",
            output.status.code(),
            output.stderr
        )));
    }

    let parsed: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| EpidError::extraction_failed(format!("parsing ffprobe output: {e}")))?;

    Ok(parsed
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_name: s.codec_name,
            language: s.tags.language,
        })
        .collect())
}

/// Pick the best-matching stream among `codecs`: prefer an exact
/// (case-insensitive) language match, otherwise the lowest stream index.
pub fn pick_best_track<'a>(
    streams: &'a [StreamInfo],
    codecs: &[&str],
    preferred_language: Option<&str>,
) -> Option<&'a StreamInfo> {
    let candidates: Vec<&StreamInfo> = streams
        .iter()
        .filter(|s| codecs.iter().any(|c| c.eq_ignore_ascii_case(&s.codec_name)))
        .collect();

    if candidates.is_empty() {
        return None;
    }

    if let Some(lang) = preferred_language {
        if let Some(exact) = candidates
            .iter()
            .find(|s| s.language.as_deref().is_some_and(|l| l.eq_ignore_ascii_case(lang)))
        {
            return Some(exact);
        }
    }

    candidates.into_iter().min_by_key(|s| s.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, codec: &str, language: Option<&str>) -> StreamInfo {
        StreamInfo {
            index,
            codec_name: codec.to_string(),
            language: language.map(str::to_string),
        }
    }

    #[test]
    fn prefers_language_match_over_track_index() {
        let streams = vec![
            stream(0, "subrip", Some("eng")),
            stream(1, "subrip", Some("jpn")),
        ];
        let best = pick_best_track(&streams, &["subrip"], Some("jpn")).unwrap();
        assert_eq!(best.index, 1);
    }

    #[test]
    fn falls_back_to_lowest_index_without_a_language_match() {
        let streams = vec![stream(2, "subrip", None), stream(0, "subrip", None)];
        let best = pick_best_track(&streams, &["subrip"], Some("fra")).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn filters_out_streams_with_unrelated_codecs() {
        let streams = vec![stream(0, "hdmv_pgs_subtitle", None)];
        assert!(pick_best_track(&streams, &["subrip", "ass"], None).is_none());
    }
}
