//! Relevance ranking and near-duplicate headline suppression.
//!
//! Dedup runs on the ranked list, so within a cluster of similar headlines the most
//! relevant one is the one that survives.

use std::collections::HashSet;

use tracing::debug;

use super::RankedArticle;

pub const DUPLICATE_THRESHOLD: f64 = 0.7;

/// Stable sort, highest relevance first; ties keep their input order.
pub fn rank_by_relevance(mut articles: Vec<RankedArticle>) -> Vec<RankedArticle> {
    articles.sort_by(|a, b| b.relevance().cmp(&a.relevance()));
    articles
}

/// Lowercase ASCII alphanumeric word set of a headline. Any other character separates words.
pub fn title_tokens(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Intersection over union; 0 when either set is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let inter = a.intersection(b).count();
    let union = a.len() + b.len() - inter;
    inter as f64 / union as f64
}

/// Single left-to-right pass: drop any article whose title is at least `threshold`
/// similar to an already accepted title. Returns survivors in their input order.
pub fn dedupe_by_title(ranked: Vec<RankedArticle>, threshold: f64) -> Vec<RankedArticle> {
    let mut accepted: Vec<HashSet<String>> = Vec::new();
    let mut out = Vec::with_capacity(ranked.len());
    for art in ranked {
        let tokens = title_tokens(art.title());
        let dup = accepted
            .iter()
            .map(|prev| jaccard(&tokens, prev))
            .find(|sim| *sim >= threshold);
        match dup {
            Some(sim) => {
                debug!(target: "news_scrape", jaccard = sim, title = art.title(), "skipping near-duplicate");
            }
            None => {
                accepted.push(tokens);
                out.push(art);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::AnalysisResult;
    use crate::ingest::types::Candidate;

    fn art(title: &str, score: u8) -> RankedArticle {
        RankedArticle {
            candidate: Candidate::new(title),
            analysis: AnalysisResult {
                relevance_score: score,
                categories: vec![],
                summary_points: vec![],
            },
        }
    }

    fn titles(v: &[RankedArticle]) -> Vec<&str> {
        v.iter().map(|a| a.title()).collect()
    }

    #[test]
    fn ranking_is_stable_and_descending() {
        let ranked = rank_by_relevance(vec![
            art("a", 50),
            art("b", 90),
            art("c", 50),
            art("d", 90),
            art("e", 10),
        ]);
        assert_eq!(titles(&ranked), vec!["b", "d", "a", "c", "e"]);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].relevance() >= w[1].relevance()));
    }

    #[test]
    fn tokens_ignore_case_and_punctuation() {
        let t = title_tokens("Fed's  RATE-cut: rate cut!");
        let want: HashSet<String> = ["fed", "s", "rate", "cut"].iter().map(|s| s.to_string()).collect();
        assert_eq!(t, want);
    }

    #[test]
    fn non_ascii_letters_split_words() {
        let t = title_tokens("Zürich bank hikes 2% — Börse reacts");
        let want: HashSet<String> = ["z", "rich", "bank", "hikes", "2", "b", "rse", "reacts"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(t, want);
    }

    #[test]
    fn jaccard_edges() {
        let a = title_tokens("fed cuts rates");
        let b = title_tokens("Fed cuts interest rates");
        assert!((jaccard(&a, &b) - 0.75).abs() < 1e-9);
        assert_eq!(jaccard(&a, &HashSet::new()), 0.0);
        assert_eq!(jaccard(&a, &a), 1.0);
    }

    #[test]
    fn higher_ranked_duplicate_wins() {
        let ranked = rank_by_relevance(vec![
            art("Fed cuts interest rates", 84),
            art("Local bakery opens", 20),
            art("Fed cuts rates", 88),
        ]);
        let kept = dedupe_by_title(ranked, DUPLICATE_THRESHOLD);
        assert_eq!(titles(&kept), vec!["Fed cuts rates", "Local bakery opens"]);
    }

    #[test]
    fn dedup_is_idempotent_and_pairwise_distinct() {
        let ranked = rank_by_relevance(vec![
            art("Oil prices jump on supply fears", 70),
            art("Oil prices jump on supply fears again", 65),
            art("Nvidia earnings beat estimates", 95),
            art("Nvidia earnings beat analyst estimates", 93),
            art("ECB holds rates steady", 60),
            art("", 5),
            art("", 4),
        ]);
        let once = dedupe_by_title(ranked, DUPLICATE_THRESHOLD);
        let twice = dedupe_by_title(once.clone(), DUPLICATE_THRESHOLD);
        assert_eq!(once, twice);
        for (i, a) in once.iter().enumerate() {
            for b in &once[i + 1..] {
                let sim = jaccard(&title_tokens(a.title()), &title_tokens(b.title()));
                assert!(sim < DUPLICATE_THRESHOLD, "{} ~ {}", a.title(), b.title());
            }
        }
        assert_eq!(once.len(), 5);
    }
}
