// src/store/supabase.rs
//! Supabase `Articles` table over the PostgREST HTTP interface.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

use super::{ArticleInsert, ArticleStore, RelevanceRow};
use crate::config::StoreConfig;

pub struct SupabaseStore {
    http: reqwest::Client,
    table_url: String,
    key: String,
}

#[derive(Deserialize)]
struct IdOnly {
    #[allow(dead_code)]
    id: i64,
}

impl SupabaseStore {
    /// `None` when the URL or service key is missing.
    pub fn from_config(cfg: &StoreConfig) -> Result<Option<Self>> {
        let (Some(url), Some(key)) = (cfg.url.as_deref(), cfg.service_key.as_deref()) else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .user_agent("econ-news-pipeline/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Some(Self {
            http,
            table_url: format!("{}/rest/v1/{}", url.trim_end_matches('/'), cfg.table),
            key: key.to_string(),
        }))
    }

    fn request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        self.http
            .request(method, &self.table_url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!(
            "{what} failed: HTTP {status}: {}",
            body.chars().take(300).collect::<String>()
        ))
    }
}

#[async_trait]
impl ArticleStore for SupabaseStore {
    async fn link_exists(&self, link: &str) -> Result<bool> {
        let eq = format!("eq.{link}");
        let resp = self
            .request(reqwest::Method::GET)
            .query(&[("select", "id"), ("link", eq.as_str()), ("limit", "1")])
            .send()
            .await
            .context("link lookup")?;
        let rows: Vec<IdOnly> = Self::check(resp, "link lookup").await?.json().await?;
        Ok(!rows.is_empty())
    }

    async fn insert(&self, row: &ArticleInsert) -> Result<()> {
        let resp = self
            .request(reqwest::Method::POST)
            .header("Prefer", "return=minimal")
            .json(&[row])
            .send()
            .await
            .context("article insert")?;
        Self::check(resp, "article insert").await?;
        Ok(())
    }

    async fn positive_relevance(&self) -> Result<Vec<RelevanceRow>> {
        let resp = self
            .request(reqwest::Method::GET)
            .query(&[("select", "id,relevance"), ("relevance", "gt.0")])
            .send()
            .await
            .context("relevance scan")?;
        Ok(Self::check(resp, "relevance scan").await?.json().await?)
    }

    async fn set_relevance(&self, id: i64, relevance: i32) -> Result<()> {
        let eq = format!("eq.{id}");
        let resp = self
            .request(reqwest::Method::PATCH)
            .query(&[("id", eq.as_str())])
            .json(&serde_json::json!({ "relevance": relevance }))
            .send()
            .await
            .context("relevance update")?;
        Self::check(resp, "relevance update").await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let eq = format!("eq.{id}");
        let resp = self
            .request(reqwest::Method::DELETE)
            .query(&[("id", eq.as_str())])
            .send()
            .await
            .context("article delete")?;
        Self::check(resp, "article delete").await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "supabase"
    }
}
