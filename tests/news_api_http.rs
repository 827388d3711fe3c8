//! Paginated news feed provider over a mock HTTP server.

use chrono::NaiveDate;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use econ_news_pipeline::config::FeedConfig;
use econ_news_pipeline::ingest::fetcher::fetch_candidates;
use econ_news_pipeline::ingest::providers::news_api::NewsApiFeed;
use econ_news_pipeline::ingest::types::{FeedSource, PageRequest};
use econ_news_pipeline::phase::Phase;

fn feed_config(server_url: &str, page_size: usize) -> FeedConfig {
    FeedConfig {
        url: Some(format!("{server_url}/v1/news/all")),
        api_key: Some("feed-key".into()),
        page_size,
        ..FeedConfig::default()
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

#[tokio::test]
async fn sends_range_paging_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/news/all"))
        .and(query_param("api_token", "feed-key"))
        .and(query_param("from", "2024-06-01"))
        .and(query_param("to", "2024-06-02"))
        .and(query_param("limit", "25"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "title": "A" }, { "title": "B" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let feed = NewsApiFeed::from_config(&feed_config(&server.uri(), 100))
        .unwrap()
        .expect("configured");
    let items = feed
        .fetch_page(&PageRequest {
            from: day(1),
            to: day(2),
            page: 3,
            size: 25,
        })
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn data_envelope_and_short_page_stop() {
    let server = MockServer::start().await;
    let page1: Vec<_> = (0..3)
        .map(|i| json!({ "headline": format!("Headline {i}"), "url": format!("https://n.test/{i}") }))
        .collect();
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": page1 })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "title": "Tail &amp; end", "published_at": "2024-06-02 08:00:00" }],
            "meta": { "found": 4 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let feed = NewsApiFeed::from_config(&feed_config(&server.uri(), 3))
        .unwrap()
        .expect("configured");
    let out = fetch_candidates(&feed, day(1), day(2), 50, &Phase::detached())
        .await
        .unwrap();

    assert_eq!(out.pages, 2);
    assert_eq!(out.candidates.len(), 4);
    assert_eq!(out.candidates[0].title, "Headline 0");
    assert_eq!(out.candidates[0].link.as_deref(), Some("https://n.test/0"));
    assert_eq!(out.candidates[3].title, "Tail & end");
    assert_eq!(
        out.candidates[3].published_at.as_deref(),
        Some("2024-06-02T08:00:00.000Z")
    );
}

#[tokio::test]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let feed = NewsApiFeed::from_config(&feed_config(&server.uri(), 10))
        .unwrap()
        .expect("configured");
    let err = fetch_candidates(&feed, day(1), day(1), 10, &Phase::detached())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("503"), "got: {err}");
}

#[test]
fn missing_credentials_mean_unconfigured() {
    let cfg = FeedConfig {
        api_key: None,
        ..feed_config("http://localhost", 10)
    };
    assert!(NewsApiFeed::from_config(&cfg).unwrap().is_none());
}
