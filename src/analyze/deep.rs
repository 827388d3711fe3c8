//! Expensive second pass: grouped relevance/category/summary analysis.
//!
//! Candidates are cut into windows, each window into groups; a bounded pool of workers
//! drains a shared group queue. A group that fails (after retries) or returns malformed
//! output marks every one of its items failed; other groups are unaffected. Results are
//! reassembled in input order whatever order the workers finish in.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use metrics::counter;
use serde_json::Value;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::backoff::{call_with_backoff, BackoffPolicy};
use super::categories::coerce_categories;
use super::extract::{extract_json, ParsedJson, Shape};
use super::limiter::RateLimiter;
use super::model::{GroupItem, ScoringModel};
use super::{Analysis, AnalysisResult, FailureReason};
use crate::ingest::types::Candidate;
use crate::phase::Phase;

pub const DEFAULT_WINDOW_SIZE: usize = 100;
pub const DEFAULT_GROUP_SIZE: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 3;
const MAX_SUMMARY_POINTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerSettings {
    pub window_size: usize,
    pub group_size: usize,
    pub concurrency: usize,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            group_size: DEFAULT_GROUP_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// Parsed group response: one slot per input position, plus the optional group summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupParse {
    pub per_item: Vec<Option<AnalysisResult>>,
    pub combined: Vec<String>,
}

fn as_score(v: Option<&Value>) -> u8 {
    let raw = match v {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if raw.is_finite() {
        raw.trunc().clamp(0.0, 100.0) as u8
    } else {
        0
    }
}

fn as_points(v: Option<&Value>) -> Vec<String> {
    let Some(Value::Array(xs)) = v else {
        return Vec::new();
    };
    xs.iter()
        .filter_map(Value::as_str)
        .map(|s| {
            let t = s.trim();
            // Writer adds its own "- " bullet.
            t.strip_prefix("- ")
                .or_else(|| t.strip_prefix("* "))
                .unwrap_or(t)
                .trim()
                .to_string()
        })
        .filter(|s| !s.is_empty())
        .take(MAX_SUMMARY_POINTS)
        .collect()
}

/// Coerce one `articles[]` entry. Non-objects yield `None`.
pub fn coerce_entry(entry: &Value) -> Option<AnalysisResult> {
    let obj = entry.as_object()?;
    let categories = match obj.get("categories") {
        Some(Value::Array(xs)) => coerce_categories(xs.iter().filter_map(Value::as_str)),
        _ => Vec::new(),
    };
    Some(AnalysisResult {
        relevance_score: as_score(obj.get("relevance_score")),
        categories,
        summary_points: as_points(obj.get("summary_points")),
    })
}

/// Positional parse of a group response. `None` when no usable JSON object is present.
pub fn parse_group_response(raw: &str, expected: usize) -> Option<GroupParse> {
    let obj = match extract_json(raw, Shape::Object) {
        ParsedJson::Parsed(v) => v,
        ParsedJson::Malformed(_) => return None,
    };
    let articles = obj.get("articles")?.as_array()?;
    let per_item = (0..expected)
        .map(|i| articles.get(i).and_then(coerce_entry))
        .collect();
    let combined = as_points(obj.get("combined").and_then(|c| c.get("summary_points")));
    Some(GroupParse { per_item, combined })
}

struct GroupJob {
    positions: Vec<usize>,
    items: Vec<GroupItem>,
}

pub struct DeepAnalyzer {
    model: Arc<dyn ScoringModel>,
    limiter: Arc<RateLimiter>,
    policy: BackoffPolicy,
    settings: AnalyzerSettings,
}

impl DeepAnalyzer {
    pub fn new(
        model: Arc<dyn ScoringModel>,
        limiter: Arc<RateLimiter>,
        policy: BackoffPolicy,
        settings: AnalyzerSettings,
    ) -> Self {
        Self {
            model,
            limiter,
            policy,
            settings: AnalyzerSettings {
                window_size: settings.window_size.max(1),
                group_size: settings.group_size.max(1),
                concurrency: settings.concurrency.max(1),
            },
        }
    }

    /// One `Analysis` per candidate, same order as `candidates`.
    pub async fn analyze(&self, candidates: &[Candidate], phase: &Phase) -> Vec<Analysis> {
        let mut results: Vec<Option<Analysis>> = vec![None; candidates.len()];
        let window_size = self.settings.window_size;
        let windows = candidates.len().div_ceil(window_size);

        for (w, window) in candidates.chunks(window_size).enumerate() {
            let base = w * window_size;
            let mut sendable = Vec::with_capacity(window.len());
            for (i, c) in window.iter().enumerate() {
                if c.title.trim().is_empty() {
                    results[base + i] = Some(Analysis::failed(FailureReason::MissingTitle));
                } else {
                    sendable.push((
                        base + i,
                        GroupItem {
                            idx: i,
                            title: c.title.clone(),
                            content: c.content.clone(),
                        },
                    ));
                }
            }

            let queue: VecDeque<GroupJob> = sendable
                .chunks(self.settings.group_size)
                .map(|chunk| GroupJob {
                    positions: chunk.iter().map(|(p, _)| *p).collect(),
                    items: chunk.iter().map(|(_, it)| it.clone()).collect(),
                })
                .collect();
            let groups = queue.len();
            phase.emit(format!(
                "ANALYSIS window {}/{windows} groups={groups}",
                w + 1
            ));

            for (pos, analysis) in self.run_window(queue).await {
                results[pos] = Some(analysis);
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Analysis::failed(FailureReason::WorkerLost)))
            .collect()
    }

    async fn run_window(&self, queue: VecDeque<GroupJob>) -> Vec<(usize, Analysis)> {
        let workers = self.settings.concurrency.min(queue.len());
        let queue = Arc::new(Mutex::new(queue));
        let mut set = JoinSet::new();

        for _ in 0..workers {
            let queue = Arc::clone(&queue);
            let model = Arc::clone(&self.model);
            let limiter = Arc::clone(&self.limiter);
            let policy = self.policy.clone();
            set.spawn(async move {
                let mut out = Vec::new();
                loop {
                    let job = {
                        let mut q = queue.lock().unwrap_or_else(|e| e.into_inner());
                        q.pop_front()
                    };
                    let Some(job) = job else { break };
                    let analyses =
                        analyze_group(model.as_ref(), &limiter, &policy, &job.items).await;
                    out.extend(job.positions.into_iter().zip(analyses));
                }
                out
            });
        }

        let mut collected = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(part) => collected.extend(part),
                Err(e) => warn!(target: "analysis", error = %e, "analysis worker died"),
            }
        }
        collected
    }
}

/// Score one group through the limiter/backoff path. Always returns `items.len()` entries.
pub async fn analyze_group(
    model: &dyn ScoringModel,
    limiter: &RateLimiter,
    policy: &BackoffPolicy,
    items: &[GroupItem],
) -> Vec<Analysis> {
    let fail_all = |reason| vec![Analysis::failed(reason); items.len()];

    let raw = match call_with_backoff(limiter, policy, || model.analyze_group(items)).await {
        Ok(raw) => raw,
        Err(e) => {
            counter!("scoring_failures_total", "tier" => "analysis").increment(1);
            warn!(
                target: "analysis",
                error = %e,
                quota = e.is_quota(),
                size = items.len(),
                "group analysis failed"
            );
            return fail_all(FailureReason::CallFailed);
        }
    };

    let Some(parsed) = parse_group_response(&raw, items.len()) else {
        counter!("scoring_failures_total", "tier" => "analysis").increment(1);
        warn!(target: "analysis", size = items.len(), "group response malformed");
        return fail_all(FailureReason::Malformed);
    };
    if !parsed.combined.is_empty() {
        debug!(
            target: "analysis",
            points = parsed.combined.len(),
            "group combined summary received"
        );
    }

    parsed
        .per_item
        .into_iter()
        .map(|slot| match slot {
            Some(r) => Analysis::Scored(r),
            None => Analysis::failed(FailureReason::MissingFromResponse),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_entry_clamps_and_filters() {
        let e = json!({
            "idx": 0,
            "relevance_score": "140",
            "categories": ["Technology Sector", "Gossip", 7],
            "summary_points": ["- **What happened:** X", "", 3, "**Why:** Y",
                               "a", "b", "c", "d"]
        });
        let r = coerce_entry(&e).unwrap();
        assert_eq!(r.relevance_score, 100);
        assert_eq!(r.categories, vec!["Technology Sector".to_string()]);
        assert_eq!(r.summary_points.len(), 5);
        assert_eq!(r.summary_points[0], "**What happened:** X");

        let neg = coerce_entry(&json!({"relevance_score": -3.7})).unwrap();
        assert_eq!(neg.relevance_score, 0);
        assert!(neg.categories.is_empty() && neg.summary_points.is_empty());

        assert!(coerce_entry(&json!("oops")).is_none());
    }

    #[test]
    fn group_response_is_positional_and_padded() {
        let raw = r#"```json
        {"articles": [{"idx": 0, "relevance_score": 88.9}],
         "combined": {"summary_points": ["**Theme:** rates"]}}
        ```"#;
        let p = parse_group_response(raw, 2).unwrap();
        assert_eq!(p.per_item.len(), 2);
        assert_eq!(p.per_item[0].as_ref().unwrap().relevance_score, 88);
        assert!(p.per_item[1].is_none());
        assert_eq!(p.combined, vec!["**Theme:** rates".to_string()]);
    }

    #[test]
    fn group_response_without_articles_is_malformed() {
        assert!(parse_group_response("{\"combined\": {}}", 1).is_none());
        assert!(parse_group_response("model refused", 1).is_none());
    }

    /// Scores each item by the number in its title; any group holding "boom" fails.
    struct NumberedModel;

    #[async_trait::async_trait]
    impl ScoringModel for NumberedModel {
        async fn score_titles(
            &self,
            _items: &[crate::analyze::model::TitleItem],
        ) -> Result<String, crate::analyze::ScoringError> {
            Ok("[]".into())
        }

        async fn analyze_group(
            &self,
            items: &[GroupItem],
        ) -> Result<String, crate::analyze::ScoringError> {
            if items.iter().any(|it| it.title.contains("boom")) {
                return Err(crate::analyze::ScoringError::Http {
                    status: 500,
                    body: String::new(),
                });
            }
            let articles: Vec<Value> = items
                .iter()
                .map(|it| {
                    let n: u64 = it
                        .title
                        .rsplit(' ')
                        .next()
                        .and_then(|t| t.parse().ok())
                        .unwrap_or(0);
                    json!({ "idx": it.idx, "relevance_score": n, "summary_points": ["p"] })
                })
                .collect();
            Ok(json!({ "articles": articles }).to_string())
        }

        fn name(&self) -> &'static str {
            "numbered"
        }
    }

    #[tokio::test]
    async fn results_follow_input_order_and_failures_stay_in_their_group() {
        let mut candidates: Vec<Candidate> = (0..45)
            .map(|i| Candidate::new(format!("story {i}")))
            .collect();
        candidates[3].title = "   ".into();
        // Second group of the first window: positions 21..=40 (position 3 is skipped).
        candidates[30].title = "boom 30".into();

        let analyzer = DeepAnalyzer::new(
            Arc::new(NumberedModel),
            Arc::new(RateLimiter::new(crate::analyze::Tier::Analysis, 100, true)),
            BackoffPolicy::default(),
            AnalyzerSettings {
                window_size: 40,
                group_size: 20,
                concurrency: 3,
            },
        );
        let out = analyzer.analyze(&candidates, &Phase::detached()).await;

        assert_eq!(out.len(), 45);
        assert_eq!(out[3], Analysis::failed(FailureReason::MissingTitle));
        assert_eq!(out[0].scored().unwrap().relevance_score, 0);
        assert_eq!(out[20].scored().unwrap().relevance_score, 20);
        for pos in 21..40 {
            assert_eq!(out[pos], Analysis::failed(FailureReason::CallFailed), "pos {pos}");
        }
        for pos in 40..45 {
            assert_eq!(out[pos].scored().unwrap().relevance_score, pos as u8);
        }
    }
}
