// src/ingest/providers/news_api.rs
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;

use crate::config::FeedConfig;
use crate::ingest::types::{FeedSource, PageRequest};

/// Paginated JSON news API (`?api_token=..&from=..&to=..&limit=..&page=..`).
/// Accepts either a bare array or `{ "data": [...] }`.
pub struct NewsApiFeed {
    http: reqwest::Client,
    url: reqwest::Url,
    api_key: String,
    page_param: String,
    limit_param: String,
    page_size: usize,
}

impl NewsApiFeed {
    /// `None` when the feed URL or key is missing.
    pub fn from_config(cfg: &FeedConfig) -> Result<Option<Self>> {
        let (Some(url), Some(key)) = (cfg.url.as_deref(), cfg.api_key.as_deref()) else {
            return Ok(None);
        };
        let url = reqwest::Url::parse(url).with_context(|| format!("invalid NEWS_API_URL {url}"))?;
        let http = reqwest::Client::builder()
            .user_agent("econ-news-pipeline/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Some(Self {
            http,
            url,
            api_key: key.to_string(),
            page_param: cfg.page_param.clone(),
            limit_param: cfg.limit_param.clone(),
            page_size: cfg.page_size.max(1),
        }))
    }

    fn page_url(&self, req: &PageRequest) -> reqwest::Url {
        let mut url = self.url.clone();
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("api_token", &self.api_key);
            q.append_pair("from", &req.from.format("%Y-%m-%d").to_string());
            q.append_pair("to", &req.to.format("%Y-%m-%d").to_string());
            q.append_pair(&self.limit_param, &req.size.to_string());
            if !self.page_param.is_empty() {
                q.append_pair(&self.page_param, &req.page.to_string());
            }
        }
        url
    }
}

/// Pull the item list out of either response shape.
pub fn items_from_body(body: Value) -> Vec<Value> {
    match body {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[async_trait]
impl FeedSource for NewsApiFeed {
    async fn fetch_page(&self, req: &PageRequest) -> Result<Vec<Value>> {
        let t0 = std::time::Instant::now();
        let resp = self
            .http
            .get(self.page_url(req))
            .send()
            .await
            .with_context(|| format!("fetching feed page {}", req.page))?;
        let status = resp.status();
        if !status.is_success() {
            counter!("pipeline_feed_errors_total").increment(1);
            return Err(anyhow!("feed page {} returned HTTP {}", req.page, status));
        }
        let body: Value = resp
            .json()
            .await
            .with_context(|| format!("decoding feed page {}", req.page))?;
        let items = items_from_body(body);

        histogram!("pipeline_feed_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("pipeline_feed_items_total").increment(items.len() as u64);
        Ok(items)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn name(&self) -> &'static str {
        "news-api"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_body_shapes_are_accepted() {
        assert_eq!(items_from_body(json!([{"title": "a"}])).len(), 1);
        assert_eq!(items_from_body(json!({"data": [{"title": "a"}, {}]})).len(), 2);
        assert!(items_from_body(json!({"error": "nope"})).is_empty());
        assert!(items_from_body(json!("text")).is_empty());
    }
}
