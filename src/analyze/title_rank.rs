//! Cheap first pass: score headlines only and keep the top fraction.
//!
//! Global mode ranks every scored title against every other; per-batch mode keeps the
//! top slice of each batch independently. A failed batch contributes nothing.

use std::collections::HashSet;

use metrics::counter;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use super::backoff::{call_with_backoff, BackoffPolicy};
use super::extract::{extract_json, ParsedJson, Shape};
use super::limiter::RateLimiter;
use super::model::{ScoringModel, TitleItem};
use crate::ingest::types::Candidate;
use crate::phase::Phase;

pub const DEFAULT_BATCH_SIZE: usize = 300;
pub const DEFAULT_KEEP_RATIO: f64 = 0.04;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TitleScore {
    pub candidate_index: usize,
    /// 0..=100
    pub score: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitleRankSettings {
    pub batch_size: usize,
    pub keep_ratio: f64,
}

impl Default for TitleRankSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            keep_ratio: DEFAULT_KEEP_RATIO,
        }
    }
}

impl TitleRankSettings {
    pub fn new(batch_size: usize, keep_ratio: f64) -> Self {
        Self {
            batch_size: batch_size.max(1),
            keep_ratio: if keep_ratio.is_finite() {
                keep_ratio.clamp(0.01, 1.0)
            } else {
                DEFAULT_KEEP_RATIO
            },
        }
    }
}

/// `ceil(ratio * n)`, at least 1 for a non-empty set.
pub fn keep_count(ratio: f64, n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    // Epsilon absorbs binary representation error (0.04 * 300 must be 12, not 13).
    let k = (ratio * n as f64 - 1e-9).ceil();
    (k.max(1.0) as usize).min(n)
}

fn as_int(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64),
        _ => None,
    }
}

/// Turn model text into scores for ids that belong to `batch`. Unknown ids and repeats
/// are dropped; unparseable scores count as 0.
pub fn parse_title_scores(raw: &str, batch: &[TitleItem]) -> Option<Vec<TitleScore>> {
    let arr = match extract_json(raw, Shape::Array) {
        ParsedJson::Parsed(Value::Array(arr)) => arr,
        ParsedJson::Parsed(_) | ParsedJson::Malformed(_) => return None,
    };
    let valid: HashSet<usize> = batch.iter().map(|it| it.id).collect();
    let mut seen = HashSet::new();
    let scores = arr
        .iter()
        .filter_map(|x| {
            let id = x.get("id").and_then(as_int)?;
            let id = usize::try_from(id).ok()?;
            if !valid.contains(&id) || !seen.insert(id) {
                return None;
            }
            let score = x.get("score").and_then(as_int).unwrap_or(0).clamp(0, 100) as u8;
            Some(TitleScore {
                candidate_index: id,
                score,
            })
        })
        .collect();
    Some(scores)
}

/// Highest first; equal scores keep response order.
fn top_n(mut scores: Vec<TitleScore>, n: usize) -> Vec<TitleScore> {
    scores.sort_by(|a, b| b.score.cmp(&a.score));
    scores.truncate(n);
    scores
}

pub struct TitleRanker<'a> {
    pub model: &'a dyn ScoringModel,
    pub limiter: &'a RateLimiter,
    pub policy: &'a BackoffPolicy,
    pub settings: TitleRankSettings,
}

impl TitleRanker<'_> {
    /// One scoring call. Failure of any kind yields an empty list.
    pub async fn score_batch(&self, batch: &[TitleItem]) -> Vec<TitleScore> {
        let raw = match call_with_backoff(self.limiter, self.policy, || {
            self.model.score_titles(batch)
        })
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                counter!("scoring_failures_total", "tier" => "title").increment(1);
                warn!(
                    target: "title_rank",
                    error = %e,
                    quota = e.is_quota(),
                    size = batch.len(),
                    "title batch failed"
                );
                return Vec::new();
            }
        };
        match parse_title_scores(&raw, batch) {
            Some(scores) => scores,
            None => {
                counter!("scoring_failures_total", "tier" => "title").increment(1);
                warn!(target: "title_rank", size = batch.len(), "title batch response malformed");
                Vec::new()
            }
        }
    }

    /// Indexes (into `candidates`) of the titles that survive pre-ranking, best first.
    /// Candidates with empty titles are never scored.
    pub async fn preselect(&self, candidates: &[Candidate], global: bool, phase: &Phase) -> Vec<usize> {
        let items: Vec<TitleItem> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.title.trim().is_empty())
            .map(|(id, c)| TitleItem {
                id,
                title: c.title.clone(),
            })
            .collect();
        if items.is_empty() {
            return Vec::new();
        }

        let TitleRankSettings {
            batch_size,
            keep_ratio,
        } = self.settings;
        let global = global || items.len() <= batch_size;
        phase.emit(format!(
            "TITLE-RANK start total={} batch={batch_size} keep_ratio={keep_ratio} global={global}",
            items.len()
        ));

        let batches: Vec<&[TitleItem]> = items.chunks(batch_size).collect();
        if global {
            let mut merged = Vec::with_capacity(items.len());
            for (b, batch) in batches.iter().enumerate() {
                let scores = self.score_batch(batch).await;
                phase.emit(format!(
                    "TITLE-RANK batch {}/{} scored={}",
                    b + 1,
                    batches.len(),
                    scores.len()
                ));
                merged.extend(scores);
            }
            let keep = keep_count(keep_ratio, items.len());
            let chosen: Vec<usize> = top_n(merged, keep)
                .into_iter()
                .map(|s| s.candidate_index)
                .collect();
            phase.emit(format!(
                "TITLE-RANK complete(global) selected_total={} of {}",
                chosen.len(),
                items.len()
            ));
            chosen
        } else {
            let mut chosen = Vec::new();
            let mut seen = HashSet::new();
            for (b, batch) in batches.iter().enumerate() {
                let scores = self.score_batch(batch).await;
                let scored = scores.len();
                let keep = keep_count(keep_ratio, batch.len());
                let kept = top_n(scores, keep);
                phase.emit(format!(
                    "TITLE-RANK batch {}/{} scored={scored} keep={}/{}",
                    b + 1,
                    batches.len(),
                    kept.len(),
                    batch.len()
                ));
                chosen.extend(
                    kept.into_iter()
                        .map(|s| s.candidate_index)
                        .filter(|i| seen.insert(*i)),
                );
            }
            phase.emit(format!(
                "TITLE-RANK complete(per-batch) selected_total={} of {}",
                chosen.len(),
                items.len()
            ));
            chosen
        }
    }
}
