//! Rename Service.
//!
//! Builds a target filename from the configured template, sanitizes it for
//! the host filesystem, and performs the rename the way the teacher's match
//! engine renames a subtitle next to its video: `with_file_name` plus a
//! plain `std::fs::rename`, generalized here with the collision/volume/
//! writability checks and the reserved-name/length handling the template
//! contract requires.

use std::path::{Path, PathBuf};

use crate::error::{EpidError, EpidResult};

const RESERVED_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*', '\\', '/'];
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Default platform filename length limit (bytes), per §4.10.
pub const DEFAULT_MAX_FILENAME_LEN: usize = 255;

/// Substitute `{SeriesName}`, `{Season}`, `{Episode}` and, if present,
/// `{EpisodeName}` placeholders in `template`.
pub fn apply_template(
    template: &str,
    series: &str,
    season: &str,
    episode: &str,
    episode_name: Option<&str>,
) -> String {
    template
        .replace("{SeriesName}", series)
        .replace("{Season}", season)
        .replace("{Episode}", episode)
        .replace("{EpisodeName}", episode_name.unwrap_or("").trim())
}

/// Sanitize a candidate filename (without extension) for safe use on any
/// supported filesystem, per §4.10's rule list, applied in order: reserved
/// characters and control bytes become a single space, whitespace runs
/// collapse, trailing dots/spaces are stripped, and a reserved device name
/// (case-insensitive, extension ignored) gets an underscore appended.
pub fn sanitize_stem(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.chars() {
        let replaced = if RESERVED_CHARS.contains(&ch) || (ch as u32) < 0x20 || ch == '\u{7f}' {
            ' '
        } else {
            ch
        };
        if replaced == ' ' {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(replaced);
            last_was_space = false;
        }
    }

    let trimmed = out.trim_end_matches(['.', ' ']).trim_start().to_string();
    let stem = if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed
    };

    if RESERVED_STEMS
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(&stem))
    {
        format!("{stem}_")
    } else {
        stem
    }
}

/// Truncate `stem` so that `stem.extension` fits within `max_len` bytes,
/// preserving the extension in full.
pub fn truncate_preserving_extension(stem: &str, extension: &str, max_len: usize) -> String {
    let ext_len = if extension.is_empty() {
        0
    } else {
        extension.len() + 1
    };
    if stem.len() + ext_len <= max_len {
        return stem.to_string();
    }
    let budget = max_len.saturating_sub(ext_len);
    let mut truncated = String::new();
    for ch in stem.chars() {
        if truncated.len() + ch.len_utf8() > budget {
            break;
        }
        truncated.push(ch);
    }
    if truncated.is_empty() {
        "untitled".chars().take(budget.max(1)).collect()
    } else {
        truncated
    }
}

/// Build a fully sanitized, length-bounded filename (including extension)
/// for an identified episode.
pub fn build_filename(
    template: &str,
    series: &str,
    season: &str,
    episode: &str,
    episode_name: Option<&str>,
    extension: &str,
    max_len: usize,
) -> String {
    let raw = apply_template(template, series, season, episode, episode_name);
    let stem = sanitize_stem(&raw);
    let stem = truncate_preserving_extension(&stem, extension, max_len);
    if extension.is_empty() {
        stem
    } else {
        format!("{stem}.{extension}")
    }
}

/// Renames `source` to `proposed_filename` within `source`'s own directory.
///
/// Preconditions enforced before any filesystem mutation: the source must
/// exist, the target must remain inside the source's directory (the
/// template never introduces path separators after sanitization, but this
/// is checked defensively), and no file may already exist at the target.
/// The rename itself is a same-volume `std::fs::rename`, atomic on every
/// platform this crate targets.
pub fn rename(source: &Path, proposed_filename: &str) -> EpidResult<PathBuf> {
    if !source.exists() {
        return Err(EpidError::rename_blocked(format!(
            "source {source:?} does not exist"
        )));
    }

    let parent = source
        .parent()
        .ok_or_else(|| EpidError::rename_blocked(format!("{source:?} has no parent directory")))?;

    if proposed_filename.contains('/') || proposed_filename.contains('\\') {
        return Err(EpidError::rename_blocked(
            "proposed filename must not contain path separators",
        ));
    }

    let target = parent.join(proposed_filename);

    if target.exists() {
        return Err(EpidError::rename_blocked(format!(
            "target {target:?} already exists"
        )));
    }

    let metadata = std::fs::metadata(source)
        .map_err(|e| EpidError::rename_blocked(format!("reading metadata for {source:?}: {e}")))?;
    if metadata.permissions().readonly() {
        return Err(EpidError::rename_blocked(format!(
            "{source:?} is not writable"
        )));
    }

    std::fs::rename(source, &target)
        .map_err(|e| EpidError::rename_blocked(format!("renaming {source:?} to {target:?}: {e}")))?;

    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_template_substitutes_all_placeholders() {
        let name = apply_template(
            "{SeriesName} - S{Season}E{Episode}",
            "Bones",
            "02",
            "13",
            None,
        );
        assert_eq!(name, "Bones - S02E13");
    }

    #[test]
    fn sanitize_replaces_reserved_characters_with_space() {
        let sanitized = sanitize_stem("Who: What? / Why*");
        assert!(!sanitized.contains(':'));
        assert!(!sanitized.contains('/'));
        assert!(!sanitized.contains('?'));
        assert!(!sanitized.contains('*'));
    }

    #[test]
    fn sanitize_collapses_whitespace_and_trims_trailing_dots() {
        let sanitized = sanitize_stem("Show   Name...   ");
        assert_eq!(sanitized, "Show Name");
    }

    #[test]
    fn sanitize_appends_underscore_to_reserved_device_names() {
        assert_eq!(sanitize_stem("con"), "con_");
        assert_eq!(sanitize_stem("COM3"), "COM3_");
        assert_eq!(sanitize_stem("Bones"), "Bones");
    }

    #[test]
    fn truncate_preserves_extension_within_limit() {
        let long_stem = "a".repeat(300);
        let truncated = truncate_preserving_extension(&long_stem, "mkv", 255);
        assert!(truncated.len() + ".mkv".len() <= 255);
    }

    #[test]
    fn build_filename_applies_template_sanitization_and_extension() {
        let name = build_filename(
            "{SeriesName} - S{Season}E{Episode}",
            "Bones",
            "02",
            "13",
            None,
            "mkv",
            255,
        );
        assert_eq!(name, "Bones - S02E13.mkv");
    }

    #[test]
    fn rename_rejects_an_existing_target() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.mkv");
        let target = dir.path().join("target.mkv");
        std::fs::write(&source, b"video").unwrap();
        std::fs::write(&target, b"occupied").unwrap();

        let err = rename(&source, "target.mkv").unwrap_err();
        assert!(matches!(err, EpidError::RenameBlocked(_)));
    }

    #[test]
    fn rename_moves_the_file_within_the_same_directory() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.mkv");
        std::fs::write(&source, b"video").unwrap();

        let target = rename(&source, "Bones - S02E13.mkv").unwrap();
        assert!(target.exists());
        assert!(!source.exists());
        assert_eq!(target.parent(), Some(dir.path()));
    }

    #[test]
    fn rename_rejects_a_filename_with_path_separators() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("input.mkv");
        std::fs::write(&source, b"video").unwrap();

        let err = rename(&source, "../escape.mkv").unwrap_err();
        assert!(matches!(err, EpidError::RenameBlocked(_)));
    }
}
