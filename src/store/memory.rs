// src/store/memory.rs
use std::sync::Mutex;

use anyhow::Result;

use super::{ArticleInsert, ArticleStore, RelevanceRow};

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArticle {
    pub id: i64,
    pub row: ArticleInsert,
}

/// Process-local store, used when no database is configured and in tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: Mutex<Vec<StoredArticle>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<StoredArticle> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredArticle>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl ArticleStore for InMemoryStore {
    async fn link_exists(&self, link: &str) -> Result<bool> {
        Ok(self
            .lock()
            .iter()
            .any(|a| a.row.link.as_deref() == Some(link)))
    }

    async fn insert(&self, row: &ArticleInsert) -> Result<()> {
        let mut rows = self.lock();
        let id = rows.iter().map(|a| a.id).max().unwrap_or(0) + 1;
        rows.push(StoredArticle {
            id,
            row: row.clone(),
        });
        Ok(())
    }

    async fn positive_relevance(&self) -> Result<Vec<RelevanceRow>> {
        Ok(self
            .lock()
            .iter()
            .filter_map(|a| {
                let relevance = a.row.relevance?;
                (relevance > 0).then_some(RelevanceRow { id: a.id, relevance })
            })
            .collect())
    }

    async fn set_relevance(&self, id: i64, relevance: i32) -> Result<()> {
        if let Some(a) = self.lock().iter_mut().find(|a| a.id == id) {
            a.row.relevance = Some(relevance);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.lock().retain(|a| a.id != id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
