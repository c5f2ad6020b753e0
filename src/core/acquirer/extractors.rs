//! Per-source-format extraction, each driving the child processes that
//! correspond to the spec's three abstract external tools: `ffmpeg`/
//! `ffprobe` as the container demuxer, `pgsrip` as the bitmap OCR
//! pipeline, and `mkvextract` + `vobsub2srt` as the DVD raster converter
//! and OCR. Command construction mirrors the pack's ffmpeg wrapper:
//! explicit argument vectors, piped stderr, a bounded timeout per call.

use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::acquirer::process::run_with_timeout;
use crate::error::EpidResult;

pub const TEXT_CODECS: &[&str] = &["subrip", "ass", "ssa", "mov_text", "webvtt", "text"];
pub const BITMAP_CODECS: &[&str] = &["hdmv_pgs_subtitle", "dvb_subtitle"];
pub const DVD_CODECS: &[&str] = &["dvd_subtitle"];

/// Outcome of attempting to extract (and, for raster sources, OCR) one
/// subtitle stream. `Failed` and `NotPresent` are both recoverable: the
/// acquisition ladder advances to the next source format on either.
pub enum ExtractOutcome {
    Text(String),
    NotPresent,
    Failed(String),
}

/// Extract a text-based subtitle stream as SRT and read it back as UTF-8
/// (lossily, since subtitle tracks are not guaranteed clean UTF-8).
pub async fn extract_text(
    video: &Path,
    stream_index: u32,
    work_dir: &Path,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> EpidResult<ExtractOutcome> {
    let out_path = work_dir.join("extracted.srt");
    let output = run_with_timeout(
        "ffmpeg",
        &[
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-map".to_string(),
            format!("0:{stream_index}"),
            "-c:s".to_string(),
            "srt".to_string(),
            out_path.to_string_lossy().into_owned(),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !output.status.success() {
        return Ok(ExtractOutcome::Failed(output.stderr));
    }

    match std::fs::read(&out_path) {
        Ok(bytes) => Ok(ExtractOutcome::Text(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) => Ok(ExtractOutcome::Failed(e.to_string())),
    }
}

/// Extract a bitmap (PGS/DVB) subtitle stream, then OCR it with `pgsrip`.
pub async fn extract_bitmap(
    video: &Path,
    stream_index: u32,
    work_dir: &Path,
    language: &str,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> EpidResult<ExtractOutcome> {
    let sup_path = work_dir.join("extracted.sup");
    let dump = run_with_timeout(
        "ffmpeg",
        &[
            "-y".to_string(),
            "-i".to_string(),
            video.to_string_lossy().into_owned(),
            "-map".to_string(),
            format!("0:{stream_index}"),
            "-c:s".to_string(),
            "copy".to_string(),
            sup_path.to_string_lossy().into_owned(),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !dump.status.success() {
        return Ok(ExtractOutcome::Failed(dump.stderr));
    }

    let ocr = run_with_timeout(
        "pgsrip",
        &[
            sup_path.to_string_lossy().into_owned(),
            "-l".to_string(),
            language.to_string(),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !ocr.status.success() {
        return Ok(ExtractOutcome::Failed(ocr.stderr));
    }

    let srt_path = sup_path.with_extension("srt");
    match std::fs::read(&srt_path) {
        Ok(bytes) => Ok(ExtractOutcome::Text(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) => Ok(ExtractOutcome::Failed(e.to_string())),
    }
}

/// Extract a DVD `.idx`/`.sub` VobSub pair via `mkvextract`, then convert
/// to text with `vobsub2srt`.
pub async fn extract_dvd(
    video: &Path,
    stream_index: u32,
    work_dir: &Path,
    language: &str,
    timeout: Duration,
    cancellation: &CancellationToken,
) -> EpidResult<ExtractOutcome> {
    let out_base = work_dir.join("extracted");
    let dump = run_with_timeout(
        "mkvextract",
        &[
            "tracks".to_string(),
            video.to_string_lossy().into_owned(),
            format!("{stream_index}:{}", out_base.to_string_lossy()),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !dump.status.success() {
        return Ok(ExtractOutcome::Failed(dump.stderr));
    }

    let ocr = run_with_timeout(
        "vobsub2srt",
        &[
            "--lang".to_string(),
            language.to_string(),
            out_base.to_string_lossy().into_owned(),
        ],
        timeout,
        cancellation,
    )
    .await?;

    if !ocr.status.success() {
        return Ok(ExtractOutcome::Failed(ocr.stderr));
    }

    let srt_path = out_base.with_extension("srt");
    match std::fs::read(&srt_path) {
        Ok(bytes) => Ok(ExtractOutcome::Text(String::from_utf8_lossy(&bytes).into_owned())),
        Err(e) => Ok(ExtractOutcome::Failed(e.to_string())),
    }
}
