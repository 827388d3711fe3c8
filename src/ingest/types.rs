// src/ingest/types.rs
use anyhow::Result;
use chrono::NaiveDate;
use serde_json::Value;

/// Normalized feed item. Field aliasing happens once in `ingest::candidate_from_feed_item`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Candidate {
    pub title: String,
    pub content: String,
    /// ISO-8601 UTC timestamp, when the feed supplied a parseable date.
    pub published_at: Option<String>,
    /// Natural dedup key against persisted rows.
    pub link: Option<String>,
    pub tickers: Vec<String>,
}

impl Candidate {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            published_at: None,
            link: None,
            tickers: Vec::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

/// One page request against the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// 1-based page number.
    pub page: u32,
    pub size: usize,
}

#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Raw items of one page. An empty vector means end of feed.
    async fn fetch_page(&self, req: &PageRequest) -> Result<Vec<Value>>;
    /// Fixed page size used by the fetcher.
    fn page_size(&self) -> usize;
    /// Short label used in phase events and logs.
    fn name(&self) -> &'static str;
}
