//! Closed category vocabulary shared by the analysis prompt and result coercion.

pub const CATEGORIES: [&str; 10] = [
    "Macroeconomics & Policy",
    "Market Analysis & Sentiment",
    "Geopolitics & Regulation",
    "Corporate Earnings & Guidance",
    "Mergers & Acquisitions (M&A)",
    "Technology Sector",
    "Energy & Commodities",
    "Healthcare & Pharma",
    "Consumer & Retail",
    "Digital Assets & Crypto",
];

/// Map a model-supplied label onto the canonical vocabulary (case/whitespace-insensitive).
pub fn canonical_category(raw: &str) -> Option<&'static str> {
    let wanted = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    CATEGORIES
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(&wanted))
}

/// Keep only known categories, canonicalized, first occurrence wins.
pub fn coerce_categories<'a, I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out: Vec<String> = Vec::new();
    for c in raw.into_iter().filter_map(canonical_category) {
        if !out.iter().any(|x| x == c) {
            out.push(c.to_string());
        }
    }
    out
}
