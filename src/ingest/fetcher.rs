// src/ingest/fetcher.rs
//! Page through the feed until the candidate target is met or the feed runs dry.

use anyhow::Result;
use chrono::NaiveDate;
use rand::seq::SliceRandom;

use crate::ingest::candidate_from_feed_item;
use crate::ingest::types::{Candidate, FeedSource, PageRequest};
use crate::phase::Phase;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub candidates: Vec<Candidate>,
    /// Pages requested, including the terminating short/empty page.
    pub pages: u32,
}

/// Accumulate candidates page by page. Stops on the target, on a short page, or on an
/// empty page. Any page error aborts the whole fetch.
pub async fn fetch_candidates(
    feed: &dyn FeedSource,
    from: NaiveDate,
    to: NaiveDate,
    target: usize,
    phase: &Phase,
) -> Result<FetchOutcome> {
    let page_size = feed.page_size().max(1);
    let mut collected: Vec<Candidate> = Vec::new();
    let mut page = 1u32;
    let mut pages = 0u32;

    while collected.len() < target {
        let size = page_size.min(target - collected.len());
        phase.emit(format!(
            "FETCH feed={} page={page} size={size} collected={}/{target}",
            feed.name(),
            collected.len()
        ));
        let req = PageRequest {
            from,
            to,
            page,
            size,
        };
        let batch = feed.fetch_page(&req).await?;
        pages += 1;

        if batch.is_empty() {
            phase.emit(format!("FETCH page={page} returned 0 results; stopping pagination"));
            break;
        }
        let got = batch.len();
        collected.extend(batch.iter().map(candidate_from_feed_item));
        if got < size {
            phase.emit(format!(
                "FETCH page={page} returned {got} < {size}; reached end of feed"
            ));
            break;
        }
        page += 1;
    }

    collected.truncate(target);
    Ok(FetchOutcome {
        candidates: collected,
        pages,
    })
}

/// Shuffle to remove feed-order bias before ranking. Single-item lists are left alone.
pub fn shuffle_candidates(candidates: &mut [Candidate]) -> bool {
    if candidates.len() <= 1 {
        return false;
    }
    candidates.shuffle(&mut rand::rng());
    true
}
