//! Prompt builders for the two scoring tiers.

use super::categories::CATEGORIES;
use super::model::{GroupItem, TitleItem};

const TITLE_CLIP: usize = 250;
const GROUP_TITLE_CLIP: usize = 260;
const GROUP_CONTENT_CLIP: usize = 1800;

fn clip(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn category_list() -> String {
    CATEGORIES
        .iter()
        .map(|c| format!("\"{c}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Title-only relevance prompt: one `{"id","title"}` JSON object per line.
pub fn build_title_prompt(items: &[TitleItem]) -> String {
    let lines = items
        .iter()
        .map(|it| {
            serde_json::json!({ "id": it.id, "title": clip(&it.title, TITLE_CLIP) }).to_string()
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are an expert markets editor. Score each news title for market-moving relevance for public equity investors.

Instructions:
- For EVERY input item, return an array of JSON objects with fields {{\"id\": number, \"score\": integer 0-100}}.
- 90-100: Must-read, direct high impact (Fed decisions, CPI/PPI, mega-cap earnings, major M&A, critical guidance).
- 70-89: Highly relevant sector/company news (approvals, warnings, significant launches, guidance changes).
- 40-69: Useful context but not immediate catalyst.
- 10-39: General business interest.
- 0-9: Not financial news.
- Output ONLY the JSON array. No explanations, no markdown.

Input titles (JSON per line):
{lines}
"
    )
}

/// Grouped analysis prompt for up to one group of articles.
pub fn build_group_prompt(items: &[GroupItem]) -> String {
    let payload: Vec<serde_json::Value> = items
        .iter()
        .map(|g| {
            serde_json::json!({
                "idx": g.idx,
                "title": clip(&g.title, GROUP_TITLE_CLIP),
                "content": clip(&collapse_ws(&g.content), GROUP_CONTENT_CLIP),
            })
        })
        .collect();
    let items_json = serde_json::Value::Array(payload).to_string();
    let categories = category_list();
    format!(
        "You are an expert financial analyst. Analyze the following news items and return JSON ONLY.

For EACH item, output an object with keys:
- idx: number (echo from input)
- relevance_score: integer 0-100
- categories: array of strings (from this list only: {categories})
- summary_points: array of 3-5 markdown-ready strings, each beginning with a bolded label, e.g., \"**What happened:** ...\"

Also provide a short combined summary for the whole group.

STRICT OUTPUT FORMAT (no commentary, no markdown fences):
{{
  \"articles\": [
    {{ \"idx\": number, \"relevance_score\": number, \"categories\": [string,...], \"summary_points\": [string,...] }},
    ... one per input item in the SAME ORDER ...
  ],
  \"combined\": {{ \"summary_points\": [string,...] }}
}}

INPUT_ITEMS = {items_json}
Return ONLY the JSON object."
    )
}
