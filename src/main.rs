//! News pipeline service: binary entrypoint.
//! Loads configuration, wires the pipeline, starts the scheduled jobs and serves the
//! HTTP trigger plus `/metrics`.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use econ_news_pipeline::api::{create_router, AppState};
use econ_news_pipeline::metrics::Metrics;
use econ_news_pipeline::scheduler::{parse_timezone, spawn_daily_scrape, spawn_weekly_decay};
use econ_news_pipeline::{Pipeline, PipelineConfig};

/// Compact logs by default; `NEWS_LOG_JSON=1` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("econ_news_pipeline=info,warn"));
    let json = std::env::var("NEWS_LOG_JSON").is_ok_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    // A subscriber may already be installed by the runtime.
    let _ = if json {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = PipelineConfig::load().context("loading pipeline config")?;
    let pipeline = Arc::new(
        Pipeline::from_config(&cfg)
            .context("building pipeline")?
            .with_restore_ticker(),
    );
    let metrics = Metrics::init(pipeline.limiters())?;

    if cfg.schedule.enabled {
        let tz = parse_timezone(&cfg.schedule.timezone);
        spawn_daily_scrape(Arc::clone(&pipeline), tz);
        spawn_weekly_decay(Arc::clone(pipeline.store()), tz);
        info!(timezone = %tz, "scheduled jobs started");
    }

    let state = AppState {
        pipeline,
        cron_secret: cfg.schedule.cron_secret.clone(),
    };
    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
