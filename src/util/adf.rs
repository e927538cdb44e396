use serde_json::{json, Value};

/// Wrap plain text into an Atlassian Document Format (ADF) document.
///
/// Each line becomes its own paragraph; blank lines become empty paragraphs so
/// that [`adf_to_text`] reproduces the input exactly. Empty text yields `None`.
pub fn text_to_adf(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    let paragraphs: Vec<Value> = text
        .split('\n')
        .map(|line| {
            if line.is_empty() {
                json!({ "type": "paragraph" })
            } else {
                json!({
                    "type": "paragraph",
                    "content": [{ "type": "text", "text": line }],
                })
            }
        })
        .collect();
    Some(json!({ "type": "doc", "version": 1, "content": paragraphs }))
}

/// Flatten an ADF document to plain text.
///
/// Top-level blocks are joined with newlines, inline text inside a block is
/// concatenated. Plain strings pass through unchanged.
pub fn adf_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("doc") => obj
            .get("content")
            .and_then(Value::as_array)
            .map(|blocks| {
                blocks
                    .iter()
                    .map(extract_text_from_adf)
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        other => extract_text_from_adf(other),
    }
}

/// Extract the inline text of a single ADF node.
fn extract_text_from_adf(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(arr) => arr.iter().map(extract_text_from_adf).collect(),
        Value::Object(obj) => match obj.get("type").and_then(Value::as_str) {
            Some("text") => obj
                .get("text")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_default(),
            Some("hardBreak") => "\n".into(),
            _ => obj
                .get("content")
                .map(extract_text_from_adf)
                .unwrap_or_default(),
        },
        _ => String::new(),
    }
}
