//! The uniform stdout contract (§7): every verb emits exactly one JSON
//! object describing its outcome, diagnostics and progress go to stderr.

use serde::Serialize;

use crate::core::matcher::{Candidate, MatchOutcome};
use crate::core::orchestrator::Outcome;
use crate::error::EpidError;

#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AmbiguityItem {
    pub series: String,
    pub season: String,
    pub episode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    pub confidence: f32,
}

impl From<&Candidate> for AmbiguityItem {
    fn from(c: &Candidate) -> Self {
        Self {
            series: c.series.clone(),
            season: c.season.clone(),
            episode: c.episode.clone(),
            episode_name: c.episode_name.clone(),
            confidence: c.confidence,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Envelope {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ambiguity: Vec<AmbiguityItem>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            series: None,
            season: None,
            episode: None,
            episode_name: None,
            confidence: None,
            proposed_filename: None,
            error: None,
            ambiguity: Vec::new(),
        }
    }

    pub fn from_error(error: &EpidError) -> Self {
        Self {
            status: "error",
            series: None,
            season: None,
            episode: None,
            episode_name: None,
            confidence: None,
            proposed_filename: None,
            error: Some(ErrorEnvelope {
                kind: error.kind().to_string(),
                message: error.user_friendly_message(),
            }),
            ambiguity: Vec::new(),
        }
    }

    /// Build the envelope for a completed orchestrator run, folding its
    /// `MatchOutcome` (and any rename) into the wire contract.
    pub fn from_outcome(outcome: &Outcome) -> Self {
        match &outcome.match_outcome {
            MatchOutcome::Identified {
                result,
                rename_eligible,
            } => Self {
                status: "ok",
                series: Some(result.series.clone()),
                season: Some(result.season.clone()),
                episode: Some(result.episode.clone()),
                episode_name: result.episode_name.clone(),
                confidence: Some(result.confidence),
                proposed_filename: if *rename_eligible {
                    outcome.proposed_filename.clone()
                } else {
                    None
                },
                error: None,
                ambiguity: Vec::new(),
            },
            MatchOutcome::NoMatch { ambiguity } => Self {
                status: "no_match",
                series: None,
                season: None,
                episode: None,
                episode_name: None,
                confidence: None,
                proposed_filename: None,
                error: None,
                ambiguity: ambiguity.iter().map(AmbiguityItem::from).collect(),
            },
            MatchOutcome::Ambiguous { top, ambiguity } => Self {
                status: "ambiguous",
                series: Some(top.series.clone()),
                season: Some(top.season.clone()),
                episode: Some(top.episode.clone()),
                episode_name: top.episode_name.clone(),
                confidence: Some(top.confidence),
                proposed_filename: None,
                error: None,
                ambiguity: ambiguity.iter().map(AmbiguityItem::from).collect(),
            },
        }
    }

    pub fn print(&self) {
        match serde_json::to_string(self) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("failed to serialize output envelope: {e}"),
        }
    }
}
