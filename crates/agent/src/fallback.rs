//! Recovery for a forced tool call that arrived as plain text.
//!
//! Some models answer a mandated call with `export_pdf({...})` in the text
//! stream instead of a structured call. This is best effort: the pattern is
//! anchored to the one tool name that was forced, and the captured text must
//! parse as a JSON object.

use regex_lite::Regex;
use serde_json::Value;

/// Raw JSON arguments of `tool_name({...})` found in `text`.
///
/// Each `})` after the opening brace is tried as the end of the call, shortest
/// first, so later braces in the prose do not swallow the call.
pub fn extract_text_call(text: &str, tool_name: &str) -> Option<String> {
    let pattern = format!(r"\b{}\(\{{", regex_lite::escape(tool_name));
    let re = Regex::new(&pattern).ok()?;
    re.find_iter(text).find_map(|start| {
        let open = start.end() - 1;
        let rest = &text[open..];
        rest.match_indices("})").find_map(|(end, _)| {
            let raw = &rest[..=end];
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(_)) => Some(raw.to_string()),
                _ => None,
            }
        })
    })
}
