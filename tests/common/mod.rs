// tests/common/mod.rs
//
// Scripted in-process collaborators for pipeline-level tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use econ_news_pipeline::analyze::model::{GroupItem, ScoringError, ScoringModel, TitleItem};
use econ_news_pipeline::analyze::Limiters;
use econ_news_pipeline::ingest::types::{FeedSource, PageRequest};
use econ_news_pipeline::store::{ArticleInsert, ArticleStore, InMemoryStore, RelevanceRow};
use econ_news_pipeline::Pipeline;

pub fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

pub fn item(title: &str, link: Option<&str>) -> Value {
    let mut v = json!({
        "title": title,
        "content": format!("{title}. Full story text."),
        "date": "2024-06-03T14:30:00Z",
        "symbols": ["SPY"],
    });
    if let Some(l) = link {
        v["link"] = json!(l);
    }
    v
}

/// Serves pre-built pages in order; an exhausted script returns empty pages.
pub struct ScriptedFeed {
    pages: Mutex<Vec<Vec<Value>>>,
    page_size: usize,
    pub requests: Mutex<Vec<PageRequest>>,
    fail_on_page: Option<u32>,
}

impl ScriptedFeed {
    pub fn new(page_size: usize, pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages: Mutex::new(pages),
            page_size,
            requests: Mutex::new(Vec::new()),
            fail_on_page: None,
        }
    }

    pub fn single_page(items: Vec<Value>) -> Self {
        Self::new(200, vec![items])
    }

    pub fn failing_on(page: u32, page_size: usize, pages: Vec<Vec<Value>>) -> Self {
        Self {
            fail_on_page: Some(page),
            ..Self::new(page_size, pages)
        }
    }

    pub fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().unwrap().iter().map(|r| r.size).collect()
    }
}

#[async_trait]
impl FeedSource for ScriptedFeed {
    async fn fetch_page(&self, req: &PageRequest) -> Result<Vec<Value>> {
        self.requests.lock().unwrap().push(req.clone());
        if self.fail_on_page == Some(req.page) {
            return Err(anyhow!("feed returned HTTP 502"));
        }
        let mut pages = self.pages.lock().unwrap();
        if pages.is_empty() {
            return Ok(Vec::new());
        }
        let mut page = pages.remove(0);
        page.truncate(req.size);
        Ok(page)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Scores by title lookup; unknown titles get the defaults.
pub struct ScriptedModel {
    title_scores: HashMap<String, u8>,
    deep_scores: HashMap<String, u8>,
    default_title: u8,
    default_deep: u8,
    pub fail_titles: bool,
    pub fail_groups: bool,
    group_delay: Option<Duration>,
    pub title_calls: AtomicUsize,
    pub group_calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self {
            title_scores: HashMap::new(),
            deep_scores: HashMap::new(),
            default_title: 50,
            default_deep: 60,
            fail_titles: false,
            fail_groups: false,
            group_delay: None,
            title_calls: AtomicUsize::new(0),
            group_calls: AtomicUsize::new(0),
        }
    }

    pub fn title(mut self, title: &str, score: u8) -> Self {
        self.title_scores.insert(title.to_string(), score);
        self
    }

    pub fn deep(mut self, title: &str, score: u8) -> Self {
        self.deep_scores.insert(title.to_string(), score);
        self
    }

    pub fn failing_titles(mut self) -> Self {
        self.fail_titles = true;
        self
    }

    pub fn failing_groups(mut self) -> Self {
        self.fail_groups = true;
        self
    }

    /// Every group call takes `delay` before answering.
    pub fn slow_groups(mut self, delay: Duration) -> Self {
        self.group_delay = Some(delay);
        self
    }
}

#[async_trait]
impl ScoringModel for ScriptedModel {
    async fn score_titles(&self, items: &[TitleItem]) -> Result<String, ScoringError> {
        self.title_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_titles {
            return Err(ScoringError::Http {
                status: 500,
                body: "internal".into(),
            });
        }
        let scores: Vec<Value> = items
            .iter()
            .map(|it| {
                let s = self
                    .title_scores
                    .get(&it.title)
                    .copied()
                    .unwrap_or(self.default_title);
                json!({ "id": it.id, "score": s })
            })
            .collect();
        Ok(format!("Here are the scores:\n{}", Value::Array(scores)))
    }

    async fn analyze_group(&self, items: &[GroupItem]) -> Result<String, ScoringError> {
        self.group_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.group_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_groups {
            return Err(ScoringError::Http {
                status: 500,
                body: "internal".into(),
            });
        }
        let articles: Vec<Value> = items
            .iter()
            .map(|it| {
                let s = self
                    .deep_scores
                    .get(&it.title)
                    .copied()
                    .unwrap_or(self.default_deep);
                json!({
                    "idx": it.idx,
                    "relevance_score": s,
                    "categories": ["Macroeconomics & Policy"],
                    "summary_points": [
                        format!("**What happened:** {}", it.title),
                        "**Why it matters:** rates".to_string(),
                        "**Market impact:** mixed".to_string(),
                    ],
                })
            })
            .collect();
        Ok(format!(
            "```json\n{}\n```",
            json!({ "articles": articles, "combined": { "summary_points": ["Rates in focus"] } })
        ))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Store whose inserts always fail.
#[derive(Default)]
pub struct BrokenStore;

#[async_trait]
impl ArticleStore for BrokenStore {
    async fn link_exists(&self, _link: &str) -> Result<bool> {
        Ok(false)
    }
    async fn insert(&self, _row: &ArticleInsert) -> Result<()> {
        Err(anyhow!("duplicate key value violates constraint"))
    }
    async fn positive_relevance(&self) -> Result<Vec<RelevanceRow>> {
        Ok(Vec::new())
    }
    async fn set_relevance(&self, _id: i64, _relevance: i32) -> Result<()> {
        Ok(())
    }
    async fn delete(&self, _id: i64) -> Result<()> {
        Ok(())
    }
    fn name(&self) -> &'static str {
        "broken"
    }
}

pub fn pipeline(
    feed: Option<Arc<dyn FeedSource>>,
    model: Arc<dyn ScoringModel>,
    store: Arc<dyn ArticleStore>,
) -> Pipeline {
    Pipeline::new(feed, model, store, Limiters::new(14, 14, true))
}

pub fn memory_store() -> Arc<InMemoryStore> {
    Arc::new(InMemoryStore::new())
}
