//! Subtitle Normalizer.
//!
//! Deterministically derives the four canonical variants from raw
//! subtitle text. Timecode stripping is adapted from the teacher's SRT
//! timecode regex; tag stripping follows the same inline-markup-removal
//! shape the teacher's styling module uses for subtitle cue text.

use regex::Regex;
use std::sync::LazyLock;

/// The four canonical text variants produced from one raw subtitle.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedVariants {
    /// As extracted, untouched.
    pub original: String,
    /// Timing lines and cue numbers removed.
    pub no_timecodes: String,
    /// Inline markup and style tags removed.
    pub no_html: String,
    /// Both removed, whitespace collapsed, control characters stripped.
    pub clean: String,
}

impl NormalizedVariants {
    /// True when every variant is empty — the defined "non-match source"
    /// state for empty or whitespace-only input.
    pub fn is_empty(&self) -> bool {
        self.clean.trim().is_empty()
    }
}

static CUE_NUMBER_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*\d+\s*$").unwrap());

static SRT_TIMECODE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d{1,2}:\d{2}:\d{2}[,.]\d{3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[,.]\d{3}.*$")
        .unwrap()
});

static VTT_HEADER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*WEBVTT\b.*$").unwrap());

static INLINE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").unwrap());

static ASS_OVERRIDE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{[^}]*\}").unwrap());

static CONTROL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").unwrap());

static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static BLANK_LINE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{2,}").unwrap());

/// Strip timing lines and cue-number lines, preserving dialogue lines and
/// their relative order.
fn strip_timecodes(text: &str) -> String {
    text.lines()
        .filter(|line| {
            !SRT_TIMECODE_LINE.is_match(line)
                && !CUE_NUMBER_LINE.is_match(line)
                && !VTT_HEADER_LINE.is_match(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip inline HTML-style tags (`<i>`, `<font color="...">`, ...) and
/// ASS/SSA override blocks (`{\an8}`), leaving plain text.
fn strip_markup(text: &str) -> String {
    let no_tags = INLINE_TAG.replace_all(text, "");
    ASS_OVERRIDE_BLOCK.replace_all(&no_tags, "").into_owned()
}

/// Collapse whitespace runs and blank-line runs, strip control
/// characters, and trim. No case-folding: normalization must not depend
/// on locale-sensitive casing rules.
fn collapse_whitespace(text: &str) -> String {
    let no_control = CONTROL_CHARS.replace_all(text, "");
    let collapsed_spaces = WHITESPACE_RUN.replace_all(&no_control, " ");
    let collapsed_blank_lines = BLANK_LINE_RUN.replace_all(&collapsed_spaces, "\n");
    collapsed_blank_lines
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Produce the four canonical variants from raw subtitle text.
///
/// Pure and platform-stable: given the same bytes, this always returns the
/// same four strings, on any platform, regardless of locale.
pub fn normalize(raw: &str) -> NormalizedVariants {
    if raw.trim().is_empty() {
        return NormalizedVariants::default();
    }

    let no_timecodes = strip_timecodes(raw);
    let no_html = strip_markup(raw);
    let both_removed = strip_markup(&no_timecodes);
    let clean = collapse_whitespace(&both_removed);

    NormalizedVariants {
        original: raw.to_string(),
        no_timecodes,
        no_html,
        clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_SRT: &str = "1\n00:00:01,000 --> 00:00:04,000\n<i>Hello</i> world\n\n2\n00:00:05,000 --> 00:00:07,500\nSecond line\n";

    #[test]
    fn empty_input_yields_four_empty_strings() {
        let v = normalize("   \n\t  ");
        assert!(v.original.is_empty() || v.original.trim().is_empty());
        assert!(v.no_timecodes.is_empty());
        assert!(v.no_html.is_empty());
        assert!(v.clean.is_empty());
        assert!(v.is_empty());
    }

    #[test]
    fn no_timecodes_strips_cue_numbers_and_timing_lines() {
        let v = normalize(SAMPLE_SRT);
        assert!(!v.no_timecodes.contains("-->"));
        assert!(!v.no_timecodes.contains("1\n"));
        assert!(v.no_timecodes.contains("Hello"));
    }

    #[test]
    fn no_html_strips_inline_tags_but_keeps_timecodes() {
        let v = normalize(SAMPLE_SRT);
        assert!(v.no_html.contains("-->"));
        assert!(!v.no_html.contains("<i>"));
        assert!(v.no_html.contains("Hello world"));
    }

    #[test]
    fn clean_removes_both_and_collapses_whitespace() {
        let v = normalize(SAMPLE_SRT);
        assert!(!v.clean.contains("-->"));
        assert!(!v.clean.contains("<i>"));
        assert_eq!(v.clean, "Hello world\nSecond line");
    }

    #[test]
    fn clean_is_idempotent() {
        let v1 = normalize(SAMPLE_SRT);
        let v2 = normalize(&v1.clean);
        assert_eq!(v2.clean, v1.clean);
    }

    #[test]
    fn normalization_is_stable_across_repeated_runs() {
        let a = normalize(SAMPLE_SRT);
        let b = normalize(SAMPLE_SRT);
        assert_eq!(a, b);
    }
}
