// src/store/mod.rs
//! Article persistence boundary. Rows are insert-only from the pipeline; the decay job
//! is the only writer that updates or deletes.

pub mod memory;
pub mod supabase;
pub mod writer;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryStore;
pub use supabase::SupabaseStore;
pub use writer::{build_insert, persist_articles, PersistOutcome};

/// Insert payload for the `Articles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleInsert {
    pub title: String,
    /// Markdown bullets, one `- ` line per summary point.
    pub summary: Option<String>,
    pub link: Option<String>,
    /// ISO-8601 UTC.
    pub article_date: Option<String>,
    /// `{"tickers": [...]}`; never carries analysis metadata.
    pub symbols: Option<serde_json::Value>,
    /// ISO-8601 UTC.
    pub summarized_at: String,
    pub relevance: Option<i32>,
    pub categories: Option<Vec<String>>,
}

/// Minimal projection used by the relevance decay job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelevanceRow {
    pub id: i64,
    pub relevance: i32,
}

#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    /// Whether a row with this link already exists.
    async fn link_exists(&self, link: &str) -> Result<bool>;
    async fn insert(&self, row: &ArticleInsert) -> Result<()>;
    /// Rows whose relevance is strictly positive.
    async fn positive_relevance(&self) -> Result<Vec<RelevanceRow>>;
    async fn set_relevance(&self, id: i64, relevance: i32) -> Result<()>;
    async fn delete(&self, id: i64) -> Result<()>;
    fn name(&self) -> &'static str;
}
