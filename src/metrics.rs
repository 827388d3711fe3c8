use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::analyze::Limiters;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and seed the limiter capacity gauges.
    pub fn init(limiters: &Limiters) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("pipeline_runs_total", "Pipeline runs started, by mode");
        describe_counter!("pipeline_fetched_total", "Candidates fetched from the feed");
        describe_counter!("pipeline_inserted_total", "Articles inserted into the store");
        describe_counter!("pipeline_conflicts_total", "Articles skipped because the link exists");
        describe_counter!("pipeline_insert_errors_total", "Article inserts that failed");
        describe_counter!("scoring_throttled_total", "Quota rejections from the scoring service");
        describe_counter!("scoring_retries_total", "Scoring calls retried after a quota rejection");
        describe_counter!("scoring_failures_total", "Scoring batches or groups that produced no result");
        describe_counter!("pipeline_feed_items_total", "Raw items returned by the feed");
        describe_counter!("pipeline_feed_errors_total", "Feed page requests that failed");
        describe_counter!("decay_deleted_total", "Articles removed by relevance decay");
        describe_counter!("scheduler_runs_total", "Scheduled jobs started, by job");
        describe_histogram!("pipeline_feed_fetch_ms", "Feed page request latency in milliseconds");
        describe_gauge!("limiter_capacity", "Current per-minute capacity, by tier");
        describe_gauge!("pipeline_last_run_ts", "Unix time of the last finished run");

        for limiter in [&limiters.title, &limiters.analysis] {
            gauge!("limiter_capacity", "tier" => limiter.tier().as_str())
                .set(f64::from(limiter.current_capacity()));
        }

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
