//! Per-run statistics returned by the pipeline.

use chrono::NaiveDate;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Interactive run: small candidate set, per-batch title ranking.
    #[default]
    Manual,
    /// Scheduled bulk run: large candidate set, global title ranking.
    Cron,
}

impl RunMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RunMode::Manual => "manual",
            RunMode::Cron => "cron",
        }
    }
}

/// Why a run persisted nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReason {
    MissingEnv,
    NoArticlesReturned,
    AnalysisFailedAll,
    AllInsertsFailed,
    AllDuplicates,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Fetch,
    Insert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub mode: RunMode,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub candidate_limit: usize,
    pub result_limit: Option<usize>,
    pub started_at: String,
    pub fetched_total: usize,
    pub fetch_batches: u32,
    pub preselected: usize,
    pub analyzed: usize,
    pub kept_ranked: usize,
    pub final_after_dedupe: usize,
    pub inserted: usize,
    pub conflicts: usize,
    pub insert_errors: usize,
    pub errors: Vec<RunError>,
    pub zero_reason: Option<ZeroReason>,
    pub duration_ms: u64,
}

impl PipelineStats {
    pub fn new(
        mode: RunMode,
        from: NaiveDate,
        to: NaiveDate,
        candidate_limit: usize,
        result_limit: Option<usize>,
    ) -> Self {
        Self {
            mode,
            from,
            to,
            candidate_limit,
            result_limit,
            started_at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            fetched_total: 0,
            fetch_batches: 0,
            preselected: 0,
            analyzed: 0,
            kept_ranked: 0,
            final_after_dedupe: 0,
            inserted: 0,
            conflicts: 0,
            insert_errors: 0,
            errors: Vec::new(),
            zero_reason: None,
            duration_ms: 0,
        }
    }

    pub fn push_error(&mut self, kind: ErrorKind, message: impl Into<String>, link: Option<String>) {
        self.errors.push(RunError {
            kind,
            message: message.into(),
            link,
        });
    }
}
