//! Pulls JSON arrays out of free-form model output.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

/// Returns the elements of every JSON array found in `text`, in order.
///
/// A response that is valid JSON as a whole is taken as is. Otherwise the
/// text is scanned for bracketed spans. Spans that fail to parse are
/// skipped, and an unbalanced `[` is stepped over so later arrays are still
/// found.
pub fn extract_json_arrays(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => items,
            _ => Vec::new(),
        };
    }

    let mut elements = Vec::new();
    let mut position = 0;

    while let Some(offset) = text[position..].find('[') {
        let start = position + offset;
        let Some(end) = matching_bracket(text, start) else {
            debug!(start, "unbalanced bracket in model output");
            position = start + 1;
            continue;
        };

        let candidate = &text[start..=end];
        match serde_json::from_str::<Value>(candidate) {
            Ok(Value::Array(items)) => elements.extend(items),
            Ok(_) => {}
            Err(e) => debug!(error = %e, start, "skipping unparseable array"),
        }
        position = end + 1;
    }

    elements
}

/// Byte index of the `]` closing the `[` at `start`. Brackets inside JSON
/// string literals are ignored.
fn matching_bracket(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (index, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + index);
                }
            }
            _ => {}
        }
    }
    None
}

/// Like [`extract_json_arrays`], keeping only elements that deserialize
/// into `T`.
pub fn parse_json_array<T: DeserializeOwned>(text: &str) -> Vec<T> {
    extract_json_arrays(text)
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!(error = %e, "skipping array element with unexpected shape");
                None
            }
        })
        .collect()
}
