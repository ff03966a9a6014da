#[cfg(test)]
mod tests;

use serde_json::Value;

use crate::localization::normalize_whitespace;

/// Flattens a structured rich-text document to plain text.
///
/// The editor stores answers as a JSON tree of nodes where any node may
/// carry a string `text` and an array of `children`. Everything else
/// (formatting marks, node types, link targets) is ignored. Text fragments
/// are joined with single spaces and whitespace-normalized.
#[inline]
pub fn extract_plain_text(value: &Value) -> String {
    let mut parts = Vec::new();
    visit(value, &mut parts);
    normalize_whitespace(&parts.join(" "))
}

fn visit(node: &Value, parts: &mut Vec<String>) {
    let Some(map) = node.as_object() else {
        return;
    };
    if let Some(text) = map.get("text").and_then(Value::as_str) {
        let normalized = normalize_whitespace(text);
        if !normalized.is_empty() {
            parts.push(normalized);
        }
    }
    // Editor state documents wrap everything in a `root` node.
    if let Some(root) = map.get("root") {
        visit(root, parts);
    }
    if let Some(children) = map.get("children").and_then(Value::as_array) {
        for child in children {
            visit(child, parts);
        }
    }
}
