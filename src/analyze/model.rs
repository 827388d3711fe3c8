//! Scoring model abstraction + Gemini `generateContent` provider.
//!
//! The pipeline only ever sees raw model text; parsing lives in `analyze::extract`.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::prompts::{build_group_prompt, build_title_prompt};
use crate::config::ScoringConfig;

/// One headline sent to the title tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TitleItem {
    pub id: usize,
    pub title: String,
}

/// One article sent to the deep-analysis tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupItem {
    pub idx: usize,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum ScoringError {
    /// HTTP 429 / RESOURCE_EXHAUSTED. The only retryable variant.
    #[error("quota exceeded (retry delay {retry_delay:?})")]
    Quota { retry_delay: Option<Duration> },

    #[error("scoring service returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("scoring service not configured: {0}")]
    NotConfigured(&'static str),

    #[error("scoring service returned no text")]
    EmptyResponse,
}

impl ScoringError {
    pub fn is_quota(&self) -> bool {
        matches!(self, ScoringError::Quota { .. })
    }
}

/// The two scoring calls the pipeline makes. Implementations return raw model text.
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// Expected text: a JSON array of `{id, score}`.
    async fn score_titles(&self, items: &[TitleItem]) -> Result<String, ScoringError>;
    /// Expected text: `{articles: [{idx, relevance_score, categories, summary_points}], combined}`.
    async fn analyze_group(&self, items: &[GroupItem]) -> Result<String, ScoringError>;
    fn name(&self) -> &'static str;
}

pub struct GeminiModel {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    analysis_model: String,
    title_model: String,
}

impl GeminiModel {
    pub fn new(cfg: &ScoringConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("econ-news-pipeline/0.1")
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(180))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone().unwrap_or_default(),
            base_url: cfg.api_base.trim_end_matches('/').to_string(),
            analysis_model: cfg.analysis_model.clone(),
            title_model: cfg.title_model.clone(),
        })
    }

    async fn generate(&self, model: &str, prompt: String) -> Result<String, ScoringError> {
        if self.api_key.is_empty() {
            return Err(ScoringError::NotConfigured("GEMINI_API_KEY"));
        }

        #[derive(Serialize)]
        struct Part {
            text: String,
        }
        #[derive(Serialize)]
        struct Content {
            role: &'static str,
            parts: Vec<Part>,
        }
        #[derive(Serialize)]
        struct Req {
            contents: Vec<Content>,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<RespContent>,
        }
        #[derive(Deserialize)]
        struct RespContent {
            #[serde(default)]
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }

        let url = format!("{}/v1beta/models/{}:generateContent", self.base_url, model);
        let req = Req {
            contents: vec![Content {
                role: "user",
                parts: vec![Part { text: prompt }],
            }],
        };

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let header_delay = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = resp.text().await.unwrap_or_default();
            return Err(ScoringError::Quota {
                retry_delay: parse_retry_delay(&body).or(header_delay),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ScoringError::Http {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let body: Resp = resp.json().await?;
        let text: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<String>())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(ScoringError::EmptyResponse);
        }
        Ok(text)
    }
}

#[async_trait]
impl ScoringModel for GeminiModel {
    async fn score_titles(&self, items: &[TitleItem]) -> Result<String, ScoringError> {
        self.generate(&self.title_model, build_title_prompt(items)).await
    }

    async fn analyze_group(&self, items: &[GroupItem]) -> Result<String, ScoringError> {
        self.generate(&self.analysis_model, build_group_prompt(items))
            .await
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

static RE_DELAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)s\s*$").expect("retry delay regex"));

/// Extract `google.rpc.RetryInfo.retryDelay` (e.g. `"2s"`, `"0.5s"`) from an error body.
pub fn parse_retry_delay(body: &str) -> Option<Duration> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    let details = v.get("error")?.get("details")?.as_array()?;
    details
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| t.contains("RetryInfo"))
        })
        .filter_map(|d| d.get("retryDelay").and_then(|r| r.as_str()))
        .find_map(|raw| {
            let caps = RE_DELAY.captures(raw)?;
            let secs: f64 = caps.get(1)?.as_str().parse().ok()?;
            Some(Duration::from_secs_f64(secs))
        })
}
