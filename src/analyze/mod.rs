// src/analyze/mod.rs
//! Scoring stages: title pre-ranking, grouped deep analysis, ranking + dedup,
//! and the rate limiting / backoff machinery both scoring tiers share.

pub mod backoff;
pub mod categories;
pub mod deep;
pub mod extract;
pub mod limiter;
pub mod model;
pub mod prompts;
pub mod rank;
pub mod title_rank;

use serde::Serialize;

use crate::ingest::types::Candidate;

pub use crate::analyze::backoff::{call_with_backoff, BackoffPolicy};
pub use crate::analyze::limiter::{Limiters, RateLimiter, RestoreTicker};
pub use crate::analyze::model::{GeminiModel, ScoringError, ScoringModel};

/// Independently rate-limited scoring call types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Title,
    Analysis,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Title => "title",
            Tier::Analysis => "analysis",
        }
    }
}

/// Per-article output of the deep analyzer, already coerced to valid ranges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisResult {
    /// 0..=100
    pub relevance_score: u8,
    /// Subset of `categories::CATEGORIES`.
    pub categories: Vec<String>,
    /// At most five markdown-ready bullet strings.
    pub summary_points: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    MissingTitle,
    /// Scoring call failed (quota exhausted or non-quota error).
    CallFailed,
    /// Model output had no parseable JSON object.
    Malformed,
    /// Response had fewer entries than the group.
    MissingFromResponse,
    /// Worker task died before reporting.
    WorkerLost,
}

/// Outcome of deep analysis for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis {
    Scored(AnalysisResult),
    Failed { reason: FailureReason },
}

impl Analysis {
    pub fn failed(reason: FailureReason) -> Self {
        Analysis::Failed { reason }
    }

    pub fn scored(&self) -> Option<&AnalysisResult> {
        match self {
            Analysis::Scored(r) => Some(r),
            Analysis::Failed { .. } => None,
        }
    }
}

/// A candidate with a successful analysis; what the ranker, dedup and writer see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedArticle {
    pub candidate: Candidate,
    pub analysis: AnalysisResult,
}

impl RankedArticle {
    pub fn relevance(&self) -> u8 {
        self.analysis.relevance_score
    }

    pub fn title(&self) -> &str {
        &self.candidate.title
    }
}
