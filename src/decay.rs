// src/decay.rs
//! Weekly relevance decay: every stored article loses one relevance point; articles that
//! fall below the floor are removed.

use anyhow::Result;
use metrics::counter;
use tracing::{info, warn};

use crate::store::ArticleStore;

pub const RELEVANCE_FLOOR: i32 = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecayOutcome {
    pub decremented: usize,
    pub deleted: usize,
    pub failures: usize,
}

/// Only the initial scan is fatal; per-row failures are counted and skipped.
pub async fn decay_relevance(store: &dyn ArticleStore) -> Result<DecayOutcome> {
    let rows = store.positive_relevance().await?;
    let mut out = DecayOutcome::default();

    for row in rows {
        let next = row.relevance - 1;
        let res = if next < RELEVANCE_FLOOR {
            store.delete(row.id).await.map(|_| out.deleted += 1)
        } else {
            store
                .set_relevance(row.id, next)
                .await
                .map(|_| out.decremented += 1)
        };
        if let Err(e) = res {
            out.failures += 1;
            warn!(target: "store", id = row.id, error = %e, "relevance decay failed for row");
        }
    }

    counter!("decay_deleted_total").increment(out.deleted as u64);
    info!(
        target: "store",
        decremented = out.decremented,
        deleted = out.deleted,
        failures = out.failures,
        "relevance decay finished"
    );
    Ok(out)
}
