// src/store/writer.rs
//! Insert surviving articles. Rows whose link already exists are skipped as conflicts;
//! link-less rows are always inserted. Failures are recorded per article.

use chrono::{DateTime, SecondsFormat, Utc};
use metrics::counter;
use serde_json::json;
use tracing::{debug, error};

use super::{ArticleInsert, ArticleStore};
use crate::analyze::RankedArticle;
use crate::phase::Phase;
use crate::stats::{ErrorKind, RunError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    pub inserted: usize,
    pub conflicts: usize,
    pub insert_errors: usize,
    pub errors: Vec<RunError>,
}

/// Markdown bullet list, one `- ` line per point.
pub fn summary_markdown(points: &[String]) -> Option<String> {
    if points.is_empty() {
        return None;
    }
    Some(
        points
            .iter()
            .map(|p| format!("- {p}"))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

pub fn build_insert(article: &RankedArticle, summarized_at: DateTime<Utc>) -> ArticleInsert {
    let c = &article.candidate;
    let a = &article.analysis;
    ArticleInsert {
        title: c.title.clone(),
        summary: summary_markdown(&a.summary_points),
        link: c.link.clone(),
        article_date: c.published_at.clone(),
        symbols: (!c.tickers.is_empty()).then(|| json!({ "tickers": c.tickers })),
        summarized_at: summarized_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        relevance: Some(i32::from(a.relevance_score)),
        categories: (!a.categories.is_empty()).then(|| a.categories.clone()),
    }
}

pub async fn persist_articles(
    store: &dyn ArticleStore,
    articles: &[RankedArticle],
    phase: &Phase,
) -> PersistOutcome {
    let mut out = PersistOutcome::default();
    phase.emit(format!("UPSERT start store={}", store.name()));

    for article in articles {
        let row = build_insert(article, Utc::now());
        let link = row.link.clone();

        let result = match link.as_deref() {
            Some(l) => match store.link_exists(l).await {
                Ok(true) => {
                    out.conflicts += 1;
                    counter!("pipeline_conflicts_total").increment(1);
                    debug!(target: "store", link = l, "skip duplicate link");
                    continue;
                }
                Ok(false) => store.insert(&row).await,
                Err(e) => Err(e),
            },
            None => store.insert(&row).await,
        };

        match result {
            Ok(()) => {
                out.inserted += 1;
                counter!("pipeline_inserted_total").increment(1);
                if out.inserted % 10 == 0 {
                    phase.emit(format!(
                        "UPSERT progress inserted={} conflicts={}",
                        out.inserted, out.conflicts
                    ));
                }
            }
            Err(e) => {
                out.insert_errors += 1;
                counter!("pipeline_insert_errors_total").increment(1);
                error!(target: "store", error = %e, link = ?link, "insert failed");
                out.errors.push(RunError {
                    kind: ErrorKind::Insert,
                    message: format!("{e:#}"),
                    link,
                });
            }
        }
    }

    phase.emit(format!(
        "UPSERT complete inserted={} conflicts={} errors={}",
        out.inserted, out.conflicts, out.insert_errors
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::AnalysisResult;
    use crate::ingest::types::Candidate;
    use crate::store::InMemoryStore;

    fn article(title: &str, link: Option<&str>) -> RankedArticle {
        let mut candidate = Candidate::new(title);
        candidate.link = link.map(str::to_string);
        candidate.tickers = vec!["AAPL".into()];
        RankedArticle {
            candidate,
            analysis: AnalysisResult {
                relevance_score: 77,
                categories: vec!["Technology Sector".into()],
                summary_points: vec!["**What happened:** A".into(), "**Why it matters:** B".into()],
            },
        }
    }

    #[test]
    fn insert_payload_keeps_tickers_apart_from_metadata() {
        let ts = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let row = build_insert(&article("Apple ships", Some("https://x.test/1")), ts);
        assert_eq!(
            row.summary.as_deref(),
            Some("- **What happened:** A\n- **Why it matters:** B")
        );
        assert_eq!(row.symbols, Some(json!({ "tickers": ["AAPL"] })));
        assert_eq!(row.relevance, Some(77));
        assert_eq!(row.categories, Some(vec!["Technology Sector".to_string()]));
        assert_eq!(row.summarized_at, "2024-06-01T12:00:00.000Z");
    }

    #[test]
    fn empty_summary_is_null() {
        assert_eq!(summary_markdown(&[]), None);
    }

    #[tokio::test]
    async fn conflicts_skip_and_linkless_always_insert() {
        let store = InMemoryStore::new();
        let batch = vec![
            article("a", Some("https://x.test/a")),
            article("b", None),
            article("a again", Some("https://x.test/a")),
        ];
        let out = persist_articles(&store, &batch, &Phase::detached()).await;
        assert_eq!(out.inserted, 2);
        assert_eq!(out.conflicts, 1);
        assert_eq!(out.insert_errors, 0);
        assert_eq!(store.len(), 2);
    }
}
