//! Mind-map extraction from noisy model output.
//!
//! The model is asked for a JSON object but often wraps it in code fences or
//! prose. We locate exactly one object, parse it strictly, then normalize the
//! tree into a bounded shape and reject trees that are too thin to be useful.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use noteforge_shared::{MindMapNode, NoteforgeError, Result};

/// Longest label kept, in characters.
const MAX_LABEL_CHARS: usize = 64;
/// Children kept per node after dedup.
const MAX_CHILDREN: usize = 10;
/// Deepest level kept; the root is level 0.
const MAX_LEVEL: usize = 3;
/// First-level children a usable tree needs.
const MIN_BRANCHES: usize = 4;
/// Second-level children every branch needs.
const MIN_LEAVES_PER_BRANCH: usize = 2;

// ---------------------------------------------------------------------------
// Locating the object
// ---------------------------------------------------------------------------

/// Remove a leading ```` ```lang ```` token and a trailing ```` ``` ````.
///
/// Only the fence and its language tag are dropped, so a single-line fenced
/// reply keeps its body.
pub fn strip_code_fences(text: &str) -> &str {
    static OPEN_FENCE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\A```[A-Za-z0-9_-]*[ \t]*\n?").expect("valid regex"));

    let mut body = text.trim();
    if let Some(m) = OPEN_FENCE_RE.find(body) {
        body = &body[m.end()..];
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped;
    }
    body.trim()
}

/// The first `{ ... }` object in `text`, matched by depth.
///
/// Braces inside string literals (including escaped quotes) do not count.
/// Returns `None` when no `{` exists or the scan never closes.
pub fn balanced_object(text: &str) -> Option<&str> {
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
                    let end = start + offset + ch.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

fn locate_object(text: &str) -> Result<&str> {
    let body = strip_code_fences(text);
    if body.starts_with('{') && body.ends_with('}') && balanced_object(body) == Some(body) {
        return Ok(body);
    }
    balanced_object(body)
        .ok_or_else(|| NoteforgeError::extraction("no balanced JSON object in mind-map output"))
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Extract and validate a mind-map tree from raw completion text.
pub fn extract_mind_map(text: &str) -> Result<MindMapNode> {
    let literal = locate_object(text)?;
    let value: Value = serde_json::from_str(literal)
        .map_err(|e| NoteforgeError::extraction(format!("mind-map JSON is invalid: {e}")))?;

    let root_value = match value.get("root") {
        Some(root) if root.is_object() => root,
        _ => &value,
    };

    let root = normalize_node(root_value, 0)
        .ok_or_else(|| NoteforgeError::extraction("mind-map root has no label"))?;

    validate(&root)?;
    debug!(
        branches = root.children.len(),
        depth = root.depth(),
        "mind map extracted"
    );
    Ok(root)
}

fn normalize_node(value: &Value, level: usize) -> Option<MindMapNode> {
    let label = normalize_label(value.get("label")?.as_str()?);
    if label.is_empty() {
        return None;
    }

    let mut children = Vec::new();
    if level < MAX_LEVEL {
        if let Some(items) = value.get("children").and_then(Value::as_array) {
            let mut seen = HashSet::new();
            children = items
                .iter()
                .filter(|item| item.is_object())
                .filter_map(|item| normalize_node(item, level + 1))
                .filter(|child| seen.insert(child.label.to_lowercase()))
                .take(MAX_CHILDREN)
                .collect();
        }
    }

    Some(MindMapNode { label, children })
}

fn normalize_label(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(MAX_LABEL_CHARS).collect::<String>().trim_end().to_string()
}

fn validate(root: &MindMapNode) -> Result<()> {
    if root.children.len() < MIN_BRANCHES {
        return Err(NoteforgeError::extraction(format!(
            "mind map has {} first-level branches, need at least {MIN_BRANCHES}",
            root.children.len()
        )));
    }
    if let Some(thin) = root
        .children
        .iter()
        .find(|branch| branch.children.len() < MIN_LEAVES_PER_BRANCH)
    {
        return Err(NoteforgeError::extraction(format!(
            "mind-map branch '{}' has {} children, need at least {MIN_LEAVES_PER_BRANCH}",
            thin.label,
            thin.children.len()
        )));
    }
    Ok(())
}
