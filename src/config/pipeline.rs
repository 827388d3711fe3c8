// src/config/pipeline.rs
//! Pipeline configuration: optional TOML file, then environment overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::deep::DEFAULT_CONCURRENCY;
use crate::analyze::title_rank::{DEFAULT_BATCH_SIZE, DEFAULT_KEEP_RATIO};

pub const DEFAULT_PIPELINE_CONFIG_PATH: &str = "config/pipeline.toml";
pub const ENV_PIPELINE_CONFIG_PATH: &str = "PIPELINE_CONFIG_PATH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub page_param: String,
    pub limit_param: String,
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            page_param: "page".into(),
            limit_param: "limit".into(),
            page_size: 200,
        }
    }
}

impl FeedConfig {
    pub fn is_configured(&self) -> bool {
        self.url.is_some() && self.api_key.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub analysis_model: String,
    pub title_model: String,
    pub analysis_rpm: u32,
    pub title_rpm: u32,
    /// Lower capacity on quota rejection and restore after a quiet period.
    pub adaptive: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://generativelanguage.googleapis.com".into(),
            analysis_model: "gemini-2.5-pro".into(),
            title_model: "gemini-2.5-pro".into(),
            analysis_rpm: 14,
            title_rpm: 14,
            adaptive: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub title_batch_size: usize,
    pub title_keep_ratio: f64,
    pub candidate_limit_cron: usize,
    pub candidate_limit_manual: usize,
    pub result_limit_cron: Option<usize>,
    pub result_limit_manual: Option<usize>,
    pub concurrency: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            title_batch_size: DEFAULT_BATCH_SIZE,
            title_keep_ratio: DEFAULT_KEEP_RATIO,
            candidate_limit_cron: 3000,
            candidate_limit_manual: 50,
            result_limit_cron: None,
            result_limit_manual: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub url: Option<String>,
    pub service_key: Option<String>,
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            table: "Articles".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA zone for the daily scrape and weekly decay.
    pub timezone: String,
    pub enabled: bool,
    /// Shared secret for the HTTP trigger (`x-cron-secret`).
    pub cron_secret: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Los_Angeles".into(),
            enabled: true,
            cron_secret: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub feed: FeedConfig,
    pub scoring: ScoringConfig,
    pub limits: LimitsConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parsed<T: std::str::FromStr>(v: Option<String>) -> Option<T> {
    non_empty(v).and_then(|s| s.parse().ok())
}

impl PipelineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let cfg: PipelineConfig = toml::from_str(&data)
            .with_context(|| format!("parsing pipeline config {}", path.display()))?;
        Ok(cfg)
    }

    /// File from `$PIPELINE_CONFIG_PATH` (must exist) or `config/pipeline.toml` (optional),
    /// then process environment on top.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_PIPELINE_CONFIG_PATH) {
            Ok(p) => Self::load_from_file(PathBuf::from(p))?,
            Err(_) => {
                let default = PathBuf::from(DEFAULT_PIPELINE_CONFIG_PATH);
                if default.exists() {
                    Self::load_from_file(&default)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env(|k| std::env::var(k).ok());
        Ok(cfg.sanitized())
    }

    /// Defaults + process environment only.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env(|k| std::env::var(k).ok());
        cfg.sanitized()
    }

    /// Overlay variables from `lookup` (keys are the deployment's env var names).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| non_empty(lookup(k));

        if let Some(v) = get("NEWS_API_URL") {
            self.feed.url = Some(v);
        }
        if let Some(v) = get("NEWS_API_KEY") {
            self.feed.api_key = Some(v);
        }
        if let Some(v) = lookup("NEWS_API_PAGE_PARAM") {
            // Empty disables the page parameter.
            self.feed.page_param = v.trim().to_string();
        }
        if let Some(v) = get("NEWS_API_LIMIT_PARAM") {
            self.feed.limit_param = v;
        }
        if let Some(v) = parsed(lookup("NEWS_API_PAGE_SIZE")) {
            self.feed.page_size = v;
        }

        if let Some(v) = get("GEMINI_API_KEY") {
            self.scoring.api_key = Some(v);
        }
        if let Some(v) = get("GEMINI_API_BASE") {
            self.scoring.api_base = v;
        }
        if let Some(v) = get("GEMINI_MODEL") {
            self.scoring.analysis_model = v;
        }
        if let Some(v) = get("GEMINI_TITLE_MODEL") {
            self.scoring.title_model = v;
        }
        if let Some(v) = parsed(lookup("GEMINI_SUMMARY_MAX_RPM")) {
            self.scoring.analysis_rpm = v;
        }
        if let Some(v) = parsed(lookup("GEMINI_TITLE_MAX_RPM")) {
            self.scoring.title_rpm = v;
        }
        if let Some(v) = get("GEMINI_ADAPTIVE_LIMIT") {
            self.scoring.adaptive = v != "0";
        }

        if let Some(v) = parsed(lookup("TITLE_RANK_BATCH_SIZE")) {
            self.limits.title_batch_size = v;
        }
        if let Some(v) = parsed(lookup("TITLE_RANK_KEEP_RATIO")) {
            self.limits.title_keep_ratio = v;
        }
        if let Some(v) = parsed(lookup("CANDIDATE_FETCH_LIMIT_CRON")) {
            self.limits.candidate_limit_cron = v;
        }
        if let Some(v) = parsed(lookup("CANDIDATE_FETCH_LIMIT_MANUAL")) {
            self.limits.candidate_limit_manual = v;
        }
        if let Some(v) = parsed(lookup("TOP_ARTICLE_LIMIT_CRON")) {
            self.limits.result_limit_cron = Some(v);
        }
        if let Some(v) = parsed(lookup("TOP_ARTICLE_LIMIT_MANUAL")) {
            self.limits.result_limit_manual = Some(v);
        }
        if let Some(v) = parsed(lookup("CRON_SUMMARY_CONCURRENCY")) {
            self.limits.concurrency = v;
        }

        if let Some(v) = get("SUPABASE_URL") {
            self.store.url = Some(v);
        }
        if let Some(v) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.store.service_key = Some(v);
        }

        if let Some(v) = get("SCRAPE_TIMEZONE") {
            self.schedule.timezone = v;
        }
        if let Some(v) = get("SCRAPE_SCHEDULE_ENABLED") {
            self.schedule.enabled = v != "0";
        }
        if let Some(v) = get("CRON_SECRET") {
            self.schedule.cron_secret = Some(v);
        }
    }

    /// Clamp values into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.feed.url = non_empty(self.feed.url);
        self.feed.api_key = non_empty(self.feed.api_key);
        self.feed.page_size = self.feed.page_size.max(1);
        self.scoring.analysis_rpm = self.scoring.analysis_rpm.max(1);
        self.scoring.title_rpm = self.scoring.title_rpm.max(1);
        self.limits.title_batch_size = self.limits.title_batch_size.max(1);
        self.limits.title_keep_ratio = if self.limits.title_keep_ratio.is_finite() {
            self.limits.title_keep_ratio.clamp(0.01, 1.0)
        } else {
            DEFAULT_KEEP_RATIO
        };
        self.limits.concurrency = self.limits.concurrency.max(1);
        self.limits.result_limit_cron = self.limits.result_limit_cron.filter(|n| *n > 0);
        self.limits.result_limit_manual = self.limits.result_limit_manual.filter(|n| *n > 0);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_deployment() {
        let cfg = PipelineConfig::default();
        assert!(!cfg.feed.is_configured());
        assert_eq!(cfg.feed.page_size, 200);
        assert_eq!(cfg.scoring.title_rpm, 14);
        assert!(cfg.scoring.adaptive);
        assert_eq!(cfg.limits.title_batch_size, 300);
        assert_eq!(cfg.limits.candidate_limit_cron, 3000);
        assert_eq!(cfg.limits.candidate_limit_manual, 50);
        assert_eq!(cfg.limits.concurrency, 3);
    }

    #[test]
    fn env_overrides_and_sanitizes() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_env(lookup(&[
            ("NEWS_API_URL", "https://feed.test/news"),
            ("NEWS_API_KEY", "k"),
            ("NEWS_API_PAGE_SIZE", "0"),
            ("NEWS_API_PAGE_PARAM", ""),
            ("GEMINI_ADAPTIVE_LIMIT", "0"),
            ("TITLE_RANK_KEEP_RATIO", "3.5"),
            ("TOP_ARTICLE_LIMIT_CRON", "75"),
            ("CRON_SUMMARY_CONCURRENCY", "not-a-number"),
        ]));
        let cfg = cfg.sanitized();
        assert!(cfg.feed.is_configured());
        assert_eq!(cfg.feed.page_size, 1);
        assert_eq!(cfg.feed.page_param, "");
        assert!(!cfg.scoring.adaptive);
        assert_eq!(cfg.limits.title_keep_ratio, 1.0);
        assert_eq!(cfg.limits.result_limit_cron, Some(75));
        assert_eq!(cfg.limits.concurrency, 3);
    }

    #[test]
    fn blank_credentials_count_as_missing() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_env(lookup(&[("NEWS_API_URL", "   "), ("NEWS_API_KEY", "k")]));
        assert!(!cfg.sanitized().feed.is_configured());
    }
}
