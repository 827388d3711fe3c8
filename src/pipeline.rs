// src/pipeline.rs
//! Fetch → title pre-rank → deep analysis → rank/dedup → persist, with per-run stats.

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::{counter, gauge};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use crate::analyze::deep::{AnalyzerSettings, DeepAnalyzer};
use crate::analyze::limiter::RESTORE_TICK;
use crate::analyze::rank::{dedupe_by_title, rank_by_relevance, DUPLICATE_THRESHOLD};
use crate::analyze::title_rank::{TitleRankSettings, TitleRanker};
use crate::analyze::{
    Analysis, BackoffPolicy, GeminiModel, Limiters, RankedArticle, RestoreTicker, ScoringModel,
};
use crate::config::{LimitsConfig, PipelineConfig};
use crate::ingest::fetcher::{fetch_candidates, shuffle_candidates};
use crate::ingest::providers::news_api::NewsApiFeed;
use crate::ingest::types::{Candidate, FeedSource};
use crate::phase::{Phase, PhaseEvent};
use crate::stats::{ErrorKind, PipelineStats, RunMode, ZeroReason};
use crate::store::writer::persist_articles;
use crate::store::{ArticleStore, InMemoryStore, SupabaseStore};

/// Per-run overrides; unset fields fall back to the mode defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub mode: RunMode,
    pub candidate_limit: Option<usize>,
    pub result_limit: Option<usize>,
    pub concurrency: Option<usize>,
}

impl RunOptions {
    pub fn cron() -> Self {
        Self {
            mode: RunMode::Cron,
            ..Self::default()
        }
    }

    pub fn manual() -> Self {
        Self::default()
    }
}

/// Hard failure of a run. Always carries the stats accumulated before the failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("feed fetch failed: {source:#}")]
    Fetch {
        source: anyhow::Error,
        stats: Box<PipelineStats>,
    },
}

impl PipelineError {
    pub fn stats(&self) -> &PipelineStats {
        match self {
            PipelineError::Fetch { stats, .. } => stats,
        }
    }

    pub fn into_stats(self) -> PipelineStats {
        match self {
            PipelineError::Fetch { stats, .. } => *stats,
        }
    }
}

/// Mode-dependent default limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunDefaults {
    pub candidate_limit_cron: usize,
    pub candidate_limit_manual: usize,
    pub result_limit_cron: Option<usize>,
    pub result_limit_manual: Option<usize>,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for RunDefaults {
    fn from(l: &LimitsConfig) -> Self {
        Self {
            candidate_limit_cron: l.candidate_limit_cron,
            candidate_limit_manual: l.candidate_limit_manual,
            result_limit_cron: l.result_limit_cron,
            result_limit_manual: l.result_limit_manual,
        }
    }
}

impl RunDefaults {
    fn candidate_limit(&self, mode: RunMode) -> usize {
        match mode {
            RunMode::Cron => self.candidate_limit_cron,
            RunMode::Manual => self.candidate_limit_manual,
        }
    }

    fn result_limit(&self, mode: RunMode) -> Option<usize> {
        match mode {
            RunMode::Cron => self.result_limit_cron,
            RunMode::Manual => self.result_limit_manual,
        }
    }
}

pub struct Pipeline {
    feed: Option<Arc<dyn FeedSource>>,
    model: Arc<dyn ScoringModel>,
    store: Arc<dyn ArticleStore>,
    limiters: Limiters,
    policy: BackoffPolicy,
    title_settings: TitleRankSettings,
    analyzer: AnalyzerSettings,
    defaults: RunDefaults,
    phase_sink: Option<UnboundedSender<PhaseEvent>>,
    restore_ticker: Option<RestoreTicker>,
}

impl Pipeline {
    /// `feed = None` means the feed is not configured; every run exits with `missing_env`.
    pub fn new(
        feed: Option<Arc<dyn FeedSource>>,
        model: Arc<dyn ScoringModel>,
        store: Arc<dyn ArticleStore>,
        limiters: Limiters,
    ) -> Self {
        Self {
            feed,
            model,
            store,
            limiters,
            policy: BackoffPolicy::default(),
            title_settings: TitleRankSettings::default(),
            analyzer: AnalyzerSettings::default(),
            defaults: RunDefaults::default(),
            phase_sink: None,
            restore_ticker: None,
        }
    }

    /// Wire the production collaborators from configuration. A missing store falls back
    /// to the in-memory store.
    pub fn from_config(cfg: &PipelineConfig) -> anyhow::Result<Self> {
        let feed = NewsApiFeed::from_config(&cfg.feed)?.map(|f| Arc::new(f) as Arc<dyn FeedSource>);
        if feed.is_none() {
            warn!(target: "news_scrape", "NEWS_API_URL / NEWS_API_KEY not set; runs will exit with missing_env");
        }
        let model: Arc<dyn ScoringModel> = Arc::new(GeminiModel::new(&cfg.scoring)?);
        let store: Arc<dyn ArticleStore> = match SupabaseStore::from_config(&cfg.store)? {
            Some(s) => Arc::new(s),
            None => {
                warn!(target: "store", "SUPABASE_URL / SUPABASE_SERVICE_ROLE_KEY not set; using in-memory store");
                Arc::new(InMemoryStore::new())
            }
        };
        let limiters = Limiters::new(
            cfg.scoring.title_rpm,
            cfg.scoring.analysis_rpm,
            cfg.scoring.adaptive,
        );
        let limits = &cfg.limits;
        Ok(Self::new(feed, model, store, limiters)
            .with_title_settings(TitleRankSettings::new(
                limits.title_batch_size,
                limits.title_keep_ratio,
            ))
            .with_analyzer_settings(AnalyzerSettings {
                concurrency: limits.concurrency,
                ..AnalyzerSettings::default()
            })
            .with_defaults(RunDefaults::from(limits)))
    }

    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_title_settings(mut self, settings: TitleRankSettings) -> Self {
        self.title_settings = settings;
        self
    }

    pub fn with_analyzer_settings(mut self, settings: AnalyzerSettings) -> Self {
        self.analyzer = settings;
        self
    }

    pub fn with_defaults(mut self, defaults: RunDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    /// Forward every phase event of every run to `tx`.
    pub fn with_phase_sink(mut self, tx: UnboundedSender<PhaseEvent>) -> Self {
        self.phase_sink = Some(tx);
        self
    }

    pub fn limiters(&self) -> &Limiters {
        &self.limiters
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    /// Start the adaptive-capacity restore timer. It runs until the pipeline is dropped.
    /// Must be called inside a Tokio runtime.
    pub fn with_restore_ticker(mut self) -> Self {
        self.restore_ticker = Some(self.limiters.spawn_restore_ticker(RESTORE_TICK));
        self
    }

    pub async fn run(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        opts: RunOptions,
    ) -> Result<PipelineStats, PipelineError> {
        self.run_with_sink(from, to, opts, self.phase_sink.clone())
            .await
    }

    /// Same as [`run`](Self::run) with a run-specific phase sink.
    pub async fn run_with_sink(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        opts: RunOptions,
        sink: Option<UnboundedSender<PhaseEvent>>,
    ) -> Result<PipelineStats, PipelineError> {
        let phase = Phase::start(sink);
        let mode = opts.mode;
        let candidate_limit = opts
            .candidate_limit
            .filter(|n| *n > 0)
            .unwrap_or_else(|| self.defaults.candidate_limit(mode));
        let result_limit = opts
            .result_limit
            .filter(|n| *n > 0)
            .or_else(|| self.defaults.result_limit(mode));
        let concurrency = opts
            .concurrency
            .filter(|n| *n > 0)
            .unwrap_or(self.analyzer.concurrency);

        counter!("pipeline_runs_total", "mode" => mode.as_str()).increment(1);
        phase.emit(format!(
            "INIT mode={} range={from}->{to} candidate_limit={candidate_limit} result_limit={} concurrency={concurrency} model={} rpms(analysis={}, title={})",
            mode.as_str(),
            result_limit.map_or_else(|| "all".to_string(), |n| n.to_string()),
            self.model.name(),
            self.limiters.analysis.base_capacity(),
            self.limiters.title.base_capacity(),
        ));

        let mut stats = PipelineStats::new(mode, from, to, candidate_limit, result_limit);

        let Some(feed) = self.feed.as_deref() else {
            stats.zero_reason = Some(ZeroReason::MissingEnv);
            stats.push_error(
                ErrorKind::Config,
                "Missing NEWS_API_URL or NEWS_API_KEY env var",
                None,
            );
            phase.emit("CONFIG missing required env vars");
            return Ok(finish(stats, &phase));
        };

        phase.emit("FETCH start");
        let fetched = match fetch_candidates(feed, from, to, candidate_limit, &phase).await {
            Ok(f) => f,
            Err(e) => {
                error!(target: "news_scrape", error = %format!("{e:#}"), "fetch failed; aborting run");
                phase.emit("ABORT due to error");
                stats.push_error(ErrorKind::Fetch, format!("{e:#}"), None);
                let stats = finish(stats, &phase);
                return Err(PipelineError::Fetch {
                    source: e,
                    stats: Box::new(stats),
                });
            }
        };
        phase.emit(format!("FETCH done batches={}", fetched.pages));
        stats.fetch_batches = fetched.pages;

        let mut candidates = fetched.candidates;
        if candidates.is_empty() {
            phase.emit("NO ARTICLES - EXIT");
            stats.zero_reason = Some(ZeroReason::NoArticlesReturned);
            return Ok(finish(stats, &phase));
        }
        stats.fetched_total = candidates.len();
        counter!("pipeline_fetched_total").increment(candidates.len() as u64);
        if shuffle_candidates(&mut candidates) {
            phase.emit(format!(
                "ARTICLES fetched_total={} shuffled_to_reduce_bias",
                candidates.len()
            ));
        } else {
            phase.emit(format!("ARTICLES fetched_total={}", candidates.len()));
        }

        let candidates = self.preselect(candidates, mode, &phase).await;
        stats.preselected = candidates.len();

        phase.emit(format!(
            "ANALYSIS start (grouped requests, mode={})",
            mode.as_str()
        ));
        let analyzer = DeepAnalyzer::new(
            Arc::clone(&self.model),
            Arc::clone(&self.limiters.analysis),
            self.policy.clone(),
            AnalyzerSettings {
                concurrency,
                ..self.analyzer
            },
        );
        let analyses = analyzer.analyze(&candidates, &phase).await;
        let scored: Vec<RankedArticle> = candidates
            .into_iter()
            .zip(analyses)
            .filter_map(|(candidate, analysis)| match analysis {
                Analysis::Scored(analysis) => Some(RankedArticle {
                    candidate,
                    analysis,
                }),
                Analysis::Failed { .. } => None,
            })
            .collect();
        stats.analyzed = scored.len();
        phase.emit(format!(
            "ANALYSIS complete analyzed={} of {}",
            scored.len(),
            stats.preselected
        ));
        if scored.is_empty() {
            warn!(target: "news_scrape", "no successfully analyzed articles; aborting");
            stats.zero_reason = Some(ZeroReason::AnalysisFailedAll);
            return Ok(finish(stats, &phase));
        }

        let ranked = rank_by_relevance(scored);
        stats.kept_ranked = ranked.len();
        phase.emit(format!(
            "RANK complete kept={} dyn(analysis={}, title={})",
            ranked.len(),
            self.limiters.analysis.current_capacity(),
            self.limiters.title.current_capacity()
        ));

        let mut final_list = dedupe_by_title(ranked, DUPLICATE_THRESHOLD);
        let removed = stats.kept_ranked - final_list.len();
        if let Some(limit) = result_limit {
            final_list.truncate(limit);
        }
        stats.final_after_dedupe = final_list.len();
        phase.emit(format!(
            "DEDUPE complete removed={removed} final={}",
            final_list.len()
        ));

        let persisted = persist_articles(self.store.as_ref(), &final_list, &phase).await;
        stats.inserted = persisted.inserted;
        stats.conflicts = persisted.conflicts;
        stats.insert_errors = persisted.insert_errors;
        stats.errors.extend(persisted.errors);
        if stats.inserted == 0 {
            stats.zero_reason = Some(if stats.insert_errors > 0 {
                ZeroReason::AllInsertsFailed
            } else if stats.conflicts > 0 {
                ZeroReason::AllDuplicates
            } else {
                ZeroReason::Unknown
            });
        }
        phase.emit("DONE");
        Ok(finish(stats, &phase))
    }

    /// Title pre-ranking. An empty selection falls through to the full candidate set.
    async fn preselect(&self, candidates: Vec<Candidate>, mode: RunMode, phase: &Phase) -> Vec<Candidate> {
        let ranker = TitleRanker {
            model: self.model.as_ref(),
            limiter: self.limiters.title.as_ref(),
            policy: &self.policy,
            settings: self.title_settings,
        };
        let selected = ranker
            .preselect(&candidates, mode == RunMode::Cron, phase)
            .await;
        if selected.is_empty() {
            phase.emit("TITLE-RANK produced no selection; proceeding with all articles");
            return candidates;
        }

        let before = candidates.len();
        let mut keep = vec![false; before];
        for i in selected {
            if let Some(slot) = keep.get_mut(i) {
                *slot = true;
            }
        }
        // Preserve shuffled order; the analyzer's order decides ties in ranking.
        let kept: Vec<Candidate> = candidates
            .into_iter()
            .zip(keep)
            .filter_map(|(c, k)| k.then_some(c))
            .collect();
        phase.emit(format!(
            "ARTICLES preselected_by_title before={before} after={}",
            kept.len()
        ));
        kept
    }
}

fn finish(mut stats: PipelineStats, phase: &Phase) -> PipelineStats {
    stats.duration_ms = phase.elapsed_ms();
    gauge!("pipeline_last_run_ts").set(chrono::Utc::now().timestamp() as f64);
    info!(
        target: "news_scrape",
        mode = stats.mode.as_str(),
        fetched = stats.fetched_total,
        analyzed = stats.analyzed,
        inserted = stats.inserted,
        conflicts = stats.conflicts,
        insert_errors = stats.insert_errors,
        zero_reason = ?stats.zero_reason,
        duration_ms = stats.duration_ms,
        "pipeline run finished"
    );
    stats
}
