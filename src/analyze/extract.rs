//! Locate and parse the first balanced JSON value in free-form model text.
//!
//! Models wrap answers in code fences, preambles or trailing chatter. Callers get a
//! tagged result and must handle `Malformed` explicitly.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Array,
    Object,
}

impl Shape {
    fn delimiters(self) -> (u8, u8) {
        match self {
            Shape::Array => (b'[', b']'),
            Shape::Object => (b'{', b'}'),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedJson {
    Parsed(Value),
    Malformed(String),
}

/// Strip a leading ```/```json fence and a trailing ``` fence.
pub fn strip_fences(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```") {
        s = rest
            .strip_prefix("json")
            .or_else(|| rest.strip_prefix("JSON"))
            .unwrap_or(rest);
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Byte span of the balanced value starting at `start`, honoring JSON string escapes.
fn balanced_end(bytes: &[u8], start: usize, open: u8, close: u8) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_str {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_str = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_str = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Find the first balanced array/object that parses as JSON of the requested shape.
pub fn extract_json(raw: &str, shape: Shape) -> ParsedJson {
    let text = strip_fences(raw);
    let bytes = text.as_bytes();
    let (open, close) = shape.delimiters();

    let mut from = 0usize;
    while let Some(off) = bytes[from..].iter().position(|&b| b == open) {
        let start = from + off;
        if let Some(end) = balanced_end(bytes, start, open, close) {
            if let Ok(v) = serde_json::from_str::<Value>(&text[start..=end]) {
                let shape_ok = match shape {
                    Shape::Array => v.is_array(),
                    Shape::Object => v.is_object(),
                };
                if shape_ok {
                    return ParsedJson::Parsed(v);
                }
            }
        }
        from = start + 1;
    }
    ParsedJson::Malformed(raw.to_string())
}
