use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde_json::json;
use shuttle_axum::axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::pipeline::{Pipeline, RunOptions};
use crate::stats::RunMode;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";
const MAX_RESULT_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// When set, the trigger requires a matching `x-cron-secret` header.
    pub cron_secret: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/articles/manual-scrape", post(manual_scrape))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeReq {
    from: Option<String>,
    to: Option<String>,
    limit: Option<usize>,
    candidate_limit: Option<usize>,
    /// Only `cron` selects cron mode; anything else runs manual.
    mode: Option<String>,
}

fn run_mode(raw: Option<&str>) -> RunMode {
    match raw {
        Some("cron") => RunMode::Cron,
        _ => RunMode::Manual,
    }
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
}

fn parse_day(raw: Option<&str>, default: NaiveDate) -> Result<NaiveDate, Response> {
    match raw {
        None => Ok(default),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| bad_request("Invalid date format. Use YYYY-MM-DD")),
    }
}

async fn manual_scrape(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<ScrapeReq>>,
) -> Response {
    if let Some(secret) = state.cron_secret.as_deref() {
        let given = headers
            .get(CRON_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if given != Some(secret) {
            warn!(target: "news_scrape", "manual scrape rejected: bad or missing cron secret");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthorized" })),
            )
                .into_response();
        }
    }

    let req = body.map(|Json(b)| b).unwrap_or_default();
    let today = Utc::now().date_naive();
    let yesterday = today.pred_opt().unwrap_or(today);
    let from = match parse_day(req.from.as_deref(), yesterday) {
        Ok(d) => d,
        Err(r) => return r,
    };
    let to = match parse_day(req.to.as_deref(), today) {
        Ok(d) => d,
        Err(r) => return r,
    };
    if to < from {
        return bad_request("\"to\" must not be before \"from\"");
    }

    let opts = RunOptions {
        mode: run_mode(req.mode.as_deref()),
        candidate_limit: req.candidate_limit.filter(|n| *n > 0),
        result_limit: req.limit.filter(|n| (1..=MAX_RESULT_LIMIT).contains(n)),
        concurrency: None,
    };
    info!(target: "news_scrape", %from, %to, mode = opts.mode.as_str(), "manual scrape requested");

    // The run owns its own task so a dropped request does not cancel it midway.
    let pipeline = Arc::clone(&state.pipeline);
    let run = tokio::spawn(async move { pipeline.run(from, to, opts).await });

    match run.await {
        Ok(Ok(stats)) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Ok(Err(e)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string(), "stats": e.stats() })),
        )
            .into_response(),
        Err(e) => {
            error!(target: "news_scrape", error = %e, "manual scrape task failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "stats": null })),
            )
                .into_response()
        }
    }
}
