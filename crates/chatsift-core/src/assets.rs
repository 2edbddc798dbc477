use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::conversation::model::RawConversation;

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```([A-Za-z0-9_+#.-]*)[ \t]*\n(.*?)```").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Canvas,
    CodeBlock,
}

/// A code-bearing artifact extracted from message content. Lives alongside
/// media in the conversation folder but never inside `media/`.
#[derive(Debug, Clone)]
pub struct Asset {
    pub kind: AssetKind,
    pub node_id: String,
    pub ordinal: usize,
    pub language: String,
    pub body: String,
}

impl Asset {
    /// `canvas_{node8}_{n}.{lang}` / `code_block_{node8}_{n}.{lang}`
    pub fn filename(&self) -> String {
        let prefix = match self.kind {
            AssetKind::Canvas => "canvas",
            AssetKind::CodeBlock => "code_block",
        };
        let node8: String = self.node_id.chars().take(8).collect();
        format!("{}_{}_{}.{}", prefix, node8, self.ordinal, self.language)
    }
}

/// Extract canvas artifacts and fenced code blocks from every message.
/// Nodes are visited in sorted order so asset ordinals are reproducible.
pub fn extract_assets(conv: &RawConversation) -> Vec<Asset> {
    let mut assets = Vec::new();

    let mut node_ids: Vec<&String> = conv.mapping.keys().collect();
    node_ids.sort();

    for node_id in node_ids {
        let node = &conv.mapping[node_id];
        let Some(message) = &node.message else {
            continue;
        };
        let Some(content) = &message.content else {
            continue;
        };
        let mut ordinal = 0usize;

        if content.content_type.as_deref() == Some("code") {
            let language = content
                .language
                .clone()
                .or_else(|| metadata_language(&message.metadata))
                .unwrap_or_else(|| "txt".to_string());
            let body = content.text.clone().unwrap_or_else(|| joined_parts(content));
            if !body.is_empty() {
                ordinal += 1;
                assets.push(Asset {
                    kind: AssetKind::Canvas,
                    node_id: node_id.to_string(),
                    ordinal,
                    language,
                    body,
                });
            }
            continue;
        }

        for part in content.parts.as_deref().unwrap_or(&[]) {
            let Some(text) = part.as_str() else {
                continue;
            };
            for captures in FENCE_RE.captures_iter(text) {
                let language = match captures.get(1).map(|m| m.as_str()) {
                    Some("") | None => "txt".to_string(),
                    Some(lang) => lang.to_string(),
                };
                ordinal += 1;
                assets.push(Asset {
                    kind: AssetKind::CodeBlock,
                    node_id: node_id.to_string(),
                    ordinal,
                    language,
                    body: captures.get(2).map(|m| m.as_str()).unwrap_or("").to_string(),
                });
            }
        }
    }

    assets
}

fn metadata_language(metadata: &Value) -> Option<String> {
    metadata
        .get("language")
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn joined_parts(content: &crate::conversation::model::MessageContent) -> String {
    content
        .parts
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .filter_map(|part| part.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
