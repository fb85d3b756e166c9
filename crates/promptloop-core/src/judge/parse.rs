//! Lenient decoding of judge replies.
//!
//! Judge models wrap their JSON verdict in prose or code fences, sometimes
//! after quoting an example object. Every judge-consuming component decodes
//! through [`parse_lenient_where`]: try each balanced `{...}` span in order,
//! then the span from the first `{` to the last `}`, and keep the first one
//! that decodes into a usable verdict. Callers map a [`JudgeParseError`] to
//! their own fallback verdict.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Why a judge reply could not be decoded.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JudgeParseError {
    #[error("no JSON object found in judge reply")]
    NoJsonObject,

    #[error("judge reply is not a valid verdict: {0}")]
    Invalid(String),

    #[error("judge reply has no object carrying a verdict")]
    NoVerdict,
}

/// The first balanced `{...}` span, honouring JSON string escapes.
pub fn extract_balanced_object(text: &str) -> Option<&str> {
    balanced_range(text).map(|(start, end)| &text[start..end])
}

/// Byte range of the first balanced `{...}` span.
fn balanced_range(text: &str) -> Option<(usize, usize)> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// The span from the first `{` to the last `}`.
pub fn extract_outer_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Every balanced `{...}` span in `text`, left to right.
pub fn balanced_objects(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut from = 0;
    while let Some((start, end)) = balanced_range(&text[from..]) {
        spans.push(&text[from + start..from + end]);
        from += end;
    }
    spans
}

/// Decode a verdict of type `T` embedded somewhere in `text`.
pub fn parse_lenient<T: DeserializeOwned>(text: &str) -> Result<T, JudgeParseError> {
    parse_lenient_where(text, |_: &T| true)
}

/// Decode the first candidate span that yields a `T` accepted by `usable`.
///
/// A span that decodes but fails `usable` (an example object quoted before
/// the verdict, or `{}`) is skipped. If every decodable span is skipped the
/// result is [`JudgeParseError::NoVerdict`].
pub fn parse_lenient_where<T, F>(text: &str, usable: F) -> Result<T, JudgeParseError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let mut candidates = balanced_objects(text);
    if let Some(outer) = extract_outer_object(text) {
        if !candidates.contains(&outer) {
            candidates.push(outer);
        }
    }
    if candidates.is_empty() {
        return Err(JudgeParseError::NoJsonObject);
    }

    let mut last_error = None;
    let mut decoded_any = false;
    for candidate in candidates {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) if usable(&value) => return Ok(value),
            Ok(_) => decoded_any = true,
            Err(e) => last_error = Some(e.to_string()),
        }
    }
    if decoded_any {
        return Err(JudgeParseError::NoVerdict);
    }
    Err(JudgeParseError::Invalid(last_error.unwrap_or_default()))
}

/// Accept a number, a numeric string (`"85"`, `"85%"`), or null.
pub(crate) fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }))
}

/// Accept a list of strings, a single string, or null.
pub(crate) fn lenient_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}
