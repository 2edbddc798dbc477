use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

use crate::conversation::model::LoadedConversation;
use crate::media::patterns::{TEXT_FILENAME_RE, TEXT_FILE_ID_RE, TEXT_UUID_RE};

/// The citation schemes observed across export generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationKind {
    FileIdAttachment,
    SedimentPointer,
    FileServicePointer,
    DalleAsset,
    InlineName,
    InlineUuid,
    InlineFileId,
}

impl CitationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CitationKind::FileIdAttachment => "file_id_attachment",
            CitationKind::SedimentPointer => "sediment_pointer",
            CitationKind::FileServicePointer => "file_service_pointer",
            CitationKind::DalleAsset => "dalle_asset",
            CitationKind::InlineName => "inline_name",
            CitationKind::InlineUuid => "inline_uuid",
            CitationKind::InlineFileId => "inline_file_id",
        }
    }
}

/// One reference to media found inside a message, with back-pointers so the
/// resolver never re-traverses the mapping.
#[derive(Debug, Clone)]
pub struct Citation {
    pub conversation_id: String,
    pub node_id: String,
    pub kind: CitationKind,
    /// The literal token: a `file-…` id, a 32-hex hash, a filename, a UUID.
    pub payload: String,
    pub size: Option<u64>,
    pub gen_id: Option<String>,
    pub name: Option<String>,
}

/// Collect every media citation in a conversation, in a deterministic order:
/// nodes sorted by id, then attachments before parts before free text.
pub fn extract_citations(conv: &LoadedConversation) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut seen_inline: HashSet<(CitationKind, String)> = HashSet::new();

    let mut node_ids: Vec<&String> = conv.raw.mapping.keys().collect();
    node_ids.sort();

    for node_id in node_ids {
        let node = &conv.raw.mapping[node_id];
        let Some(message) = &node.message else {
            continue;
        };

        extract_attachments(conv, node_id, &message.metadata, &mut citations);

        if let Some(content) = &message.content {
            for part in content.parts.as_deref().unwrap_or(&[]) {
                match part {
                    Value::Object(_) => {
                        extract_from_part(conv, node_id, part, &mut citations);
                    }
                    Value::String(text) => {
                        extract_from_text(conv, node_id, text, &mut citations, &mut seen_inline);
                    }
                    _ => {}
                }
            }
        }
    }

    citations
}

fn extract_attachments(
    conv: &LoadedConversation,
    node_id: &str,
    metadata: &Value,
    citations: &mut Vec<Citation>,
) {
    let Some(attachments) = metadata.get("attachments").and_then(Value::as_array) else {
        return;
    };
    for attachment in attachments {
        let Some(id) = attachment.get("id").and_then(Value::as_str) else {
            continue;
        };
        citations.push(Citation {
            conversation_id: conv.id.clone(),
            node_id: node_id.to_string(),
            kind: CitationKind::FileIdAttachment,
            payload: id.to_string(),
            size: attachment.get("size").and_then(Value::as_u64),
            gen_id: None,
            name: attachment
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
}

fn extract_from_part(
    conv: &LoadedConversation,
    node_id: &str,
    part: &Value,
    citations: &mut Vec<Citation>,
) {
    if let Some(pointer) = part.get("asset_pointer").and_then(Value::as_str) {
        let size = part.get("size_bytes").and_then(Value::as_u64);

        if let Some(rest) = pointer.strip_prefix("sediment://") {
            let hash = rest.strip_prefix("file_").unwrap_or(rest);
            citations.push(Citation {
                conversation_id: conv.id.clone(),
                node_id: node_id.to_string(),
                kind: CitationKind::SedimentPointer,
                payload: hash.to_string(),
                size,
                gen_id: None,
                name: None,
            });
        } else if let Some(file_id) = pointer.strip_prefix("file-service://") {
            let gen_id = part
                .get("metadata")
                .and_then(|m| m.get("dalle"))
                .and_then(|d| d.get("gen_id"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let kind = if gen_id.is_some() {
                CitationKind::DalleAsset
            } else {
                CitationKind::FileServicePointer
            };
            citations.push(Citation {
                conversation_id: conv.id.clone(),
                node_id: node_id.to_string(),
                kind,
                payload: file_id.to_string(),
                size,
                gen_id,
                name: None,
            });
        }
        return;
    }

    // Image parts without an asset pointer reference media by URL.
    let is_image = part
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t == "image")
        .unwrap_or(false);
    if is_image {
        if let Some(url) = part.get("image_url").and_then(Value::as_str) {
            let basename = url
                .split('?')
                .next()
                .unwrap_or(url)
                .rsplit('/')
                .next()
                .unwrap_or(url);
            if !basename.is_empty() {
                citations.push(Citation {
                    conversation_id: conv.id.clone(),
                    node_id: node_id.to_string(),
                    kind: CitationKind::InlineName,
                    payload: basename.to_string(),
                    size: None,
                    gen_id: None,
                    name: Some(basename.to_string()),
                });
            }
        }
    }
}

fn extract_from_text(
    conv: &LoadedConversation,
    node_id: &str,
    text: &str,
    citations: &mut Vec<Citation>,
    seen: &mut HashSet<(CitationKind, String)>,
) {
    let mut push = |kind: CitationKind, payload: &str| {
        if seen.insert((kind, payload.to_string())) {
            citations.push(Citation {
                conversation_id: conv.id.clone(),
                node_id: node_id.to_string(),
                kind,
                payload: payload.to_string(),
                size: None,
                gen_id: None,
                name: None,
            });
        }
    };

    for m in TEXT_FILE_ID_RE.find_iter(text) {
        // Prose URLs produce the literal token `file-service`; not a file id.
        if m.as_str() != "file-service" {
            push(CitationKind::InlineFileId, m.as_str());
        }
    }
    for m in TEXT_UUID_RE.find_iter(text) {
        push(CitationKind::InlineUuid, m.as_str());
    }
    for m in TEXT_FILENAME_RE.find_iter(text) {
        push(CitationKind::InlineName, m.as_str());
    }
}
