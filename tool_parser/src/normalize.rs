//! Entry point (a): repair a single candidate JSON snippet pulled from
//! between a `<tool_call>` / `</tool_call>` marker pair.
//!
//! Repairs, applied in order: strip whitespace, strip a wrapping fenced-code
//! block, rebalance unmatched braces, unwrap a doubled `{{…}}` wrapper when
//! the inner content is itself a JSON object. The result may still fail to
//! parse as JSON: normalization only repairs the shape, it never validates
//! semantics.

const FENCE_MARKERS: &[&str] = &["```json", "```JSON", "```"];

/// Repair `text` into something more likely to parse as JSON. Idempotent:
/// `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let text = text.trim();
    let text = strip_fence(text);
    let text = rebalance_braces(text.trim());
    unwrap_double_braces(&text)
}

fn strip_fence(text: &str) -> String {
    let mut s = text;
    for marker in FENCE_MARKERS {
        if let Some(rest) = s.strip_prefix(marker) {
            s = rest.trim_start();
            break;
        }
    }
    let s = s.trim_end();
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim().to_string()
}

fn rebalance_braces(text: &str) -> String {
    let opens = text.chars().filter(|c| *c == '{').count();
    let closes = text.chars().filter(|c| *c == '}').count();

    if opens > closes {
        let mut s = text.to_string();
        for _ in 0..(opens - closes) {
            s.push('}');
        }
        s
    } else if closes > opens {
        let mut s = text.to_string();
        let mut excess = closes - opens;
        while excess > 0 && s.ends_with('}') {
            s.pop();
            excess -= 1;
        }
        s
    } else {
        text.to_string()
    }
}

fn unwrap_double_braces(text: &str) -> String {
    if text.starts_with("{{") && text.ends_with("}}") && text.len() >= 4 {
        let inner = &text[1..text.len() - 1];
        if let Ok(serde_json::Value::Object(_)) = serde_json::from_str::<serde_json::Value>(inner)
        {
            return inner.to_string();
        }
    }
    text.to_string()
}
