//! Error types for the episode identifier.
//!
//! `EpidError` covers every error kind named in the identification design:
//! argument/config validation, environment prerequisites, subtitle
//! extraction, catalogue access, embedding inference, and the matcher's
//! own no-match/ambiguous/rename-blocked outcomes. Each variant maps to
//! one of the process's four exit codes via [`EpidError::exit_code`].

use thiserror::Error;

/// All possible errors produced while identifying or cataloguing an episode.
#[derive(Error, Debug)]
pub enum EpidError {
    /// Argument validation, an unreadable path, or a malformed configuration file.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A required external tool is not on `PATH`, or the embedding model
    /// could not be downloaded and no cached copy exists.
    #[error("environment error: {0}")]
    EnvironmentMissing(String),

    /// The demuxer, OCR pipeline, or raster converter failed or timed out
    /// on this file.
    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    /// Every source in the acquisition ladder was exhausted without
    /// producing non-empty Clean text.
    #[error("no usable subtitles found")]
    NoUsableSubtitles,

    /// The catalogue store failed to read or write.
    #[error("catalogue error: {0}")]
    CatalogueError(String),

    /// The embedding encoder was not loaded, or the inference runtime
    /// returned an error.
    #[error("inference error: {0}")]
    InferenceError(String),

    /// The pipeline ran but no candidate crossed the match threshold.
    #[error("no match found")]
    NoMatch,

    /// Several candidates fall within 10 percentage points of the top
    /// result and all are below the rename threshold.
    #[error("result is ambiguous")]
    Ambiguous,

    /// The rename could not proceed: the target exists, permission was
    /// denied, or the target would cross a filesystem volume boundary.
    #[error("rename blocked: {0}")]
    RenameBlocked(String),

    /// The operation was cancelled by the caller.
    #[error("cancelled")]
    Cancelled,

    /// Catch-all for errors that don't need their own variant.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Specialized `Result` type for episode-identifier operations.
pub type EpidResult<T> = Result<T, EpidError>;

impl EpidError {
    /// Exit code per the command-line contract: 0 success (not represented
    /// here), 1 identification failure, 2 invalid arguments/configuration,
    /// 3 fatal environment error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EpidError::InvalidInput(_) => 2,
            EpidError::EnvironmentMissing(_) => 3,
            EpidError::ExtractionFailed(_) => 1,
            EpidError::NoUsableSubtitles => 1,
            EpidError::CatalogueError(_) => 1,
            EpidError::InferenceError(_) => 1,
            EpidError::NoMatch => 1,
            EpidError::Ambiguous => 1,
            EpidError::RenameBlocked(_) => 1,
            EpidError::Cancelled => 1,
            EpidError::Other(_) => 1,
        }
    }

    /// Machine-stable error kind name, used as the `kind` field of the
    /// JSON error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            EpidError::InvalidInput(_) => "InvalidInput",
            EpidError::EnvironmentMissing(_) => "EnvironmentMissing",
            EpidError::ExtractionFailed(_) => "ExtractionFailed",
            EpidError::NoUsableSubtitles => "NoUsableSubtitles",
            EpidError::CatalogueError(_) => "CatalogueError",
            EpidError::InferenceError(_) => "InferenceError",
            EpidError::NoMatch => "NoMatch",
            EpidError::Ambiguous => "Ambiguous",
            EpidError::RenameBlocked(_) => "RenameBlocked",
            EpidError::Cancelled => "Cancelled",
            EpidError::Other(_) => "Other",
        }
    }

    /// A short remedy hint shown on stderr; the JSON envelope only carries
    /// `kind`/`message`, this is for the human-facing diagnostic line.
    pub fn user_friendly_message(&self) -> String {
        match self {
            EpidError::InvalidInput(msg) => format!("invalid input: {msg}"),
            EpidError::EnvironmentMissing(msg) => {
                format!("environment error: {msg}\nhint: check that required tools are on PATH")
            }
            EpidError::ExtractionFailed(msg) => format!("extraction failed: {msg}"),
            EpidError::NoUsableSubtitles => {
                "no usable subtitles found in any source format".to_string()
            }
            EpidError::CatalogueError(msg) => format!("catalogue error: {msg}"),
            EpidError::InferenceError(msg) => format!("inference error: {msg}"),
            EpidError::NoMatch => "no candidate crossed the match threshold".to_string(),
            EpidError::Ambiguous => "multiple close candidates, none confident enough".to_string(),
            EpidError::RenameBlocked(msg) => format!("rename blocked: {msg}"),
            EpidError::Cancelled => "operation cancelled".to_string(),
            EpidError::Other(err) => format!("unexpected error: {err}"),
        }
    }

    /// Shorthand for [`EpidError::InvalidInput`].
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        EpidError::InvalidInput(msg.into())
    }

    /// Shorthand for [`EpidError::EnvironmentMissing`].
    pub fn environment_missing<S: Into<String>>(msg: S) -> Self {
        EpidError::EnvironmentMissing(msg.into())
    }

    /// Shorthand for [`EpidError::ExtractionFailed`].
    pub fn extraction_failed<S: Into<String>>(msg: S) -> Self {
        EpidError::ExtractionFailed(msg.into())
    }

    /// Shorthand for [`EpidError::CatalogueError`].
    pub fn catalogue<S: Into<String>>(msg: S) -> Self {
        EpidError::CatalogueError(msg.into())
    }

    /// Shorthand for [`EpidError::InferenceError`].
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        EpidError::InferenceError(msg.into())
    }

    /// Shorthand for [`EpidError::RenameBlocked`].
    pub fn rename_blocked<S: Into<String>>(msg: S) -> Self {
        EpidError::RenameBlocked(msg.into())
    }
}

impl From<std::io::Error> for EpidError {
    fn from(err: std::io::Error) -> Self {
        EpidError::InvalidInput(err.to_string())
    }
}

impl From<rusqlite::Error> for EpidError {
    fn from(err: rusqlite::Error) -> Self {
        EpidError::CatalogueError(err.to_string())
    }
}

impl From<walkdir::Error> for EpidError {
    fn from(err: walkdir::Error) -> Self {
        EpidError::ExtractionFailed(err.to_string())
    }
}

impl From<serde_json::Error> for EpidError {
    fn from(err: serde_json::Error) -> Self {
        EpidError::InvalidInput(format!("malformed JSON: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_cli_contract() {
        assert_eq!(EpidError::invalid_input("x").exit_code(), 2);
        assert_eq!(EpidError::environment_missing("x").exit_code(), 3);
        assert_eq!(EpidError::NoMatch.exit_code(), 1);
        assert_eq!(EpidError::Ambiguous.exit_code(), 1);
    }

    #[test]
    fn kind_names_are_stable_for_the_json_envelope() {
        assert_eq!(EpidError::NoUsableSubtitles.kind(), "NoUsableSubtitles");
        assert_eq!(EpidError::catalogue("x").kind(), "CatalogueError");
    }

    #[test]
    fn user_friendly_message_includes_hint_for_environment_errors() {
        let msg = EpidError::environment_missing("ffprobe not found").user_friendly_message();
        assert!(msg.contains("ffprobe not found"));
        assert!(msg.contains("PATH"));
    }
}
