use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::model::{LoadedConversation, RawConversation};

/// Result of the discovery/normalization phase.
#[derive(Debug, Default)]
pub struct LoadStats {
    pub documents_scanned: usize,
    pub parse_errors: usize,
    pub duplicates_dropped: usize,
    pub empty_dropped: usize,
}

/// Discover, parse, deduplicate, and filter conversation records under the
/// extraction root. The surviving set is sorted by conversation-id so every
/// later phase sees a deterministic worklist.
pub fn load_conversations(root: &Path) -> (Vec<LoadedConversation>, LoadStats) {
    let mut stats = LoadStats::default();
    let mut by_id: HashMap<String, LoadedConversation> = HashMap::new();

    let mut documents = discover_documents(root);
    documents.sort();

    for path in documents {
        stats.documents_scanned += 1;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) => {
                warn!("Cannot read {}: {}", path.display(), err);
                stats.parse_errors += 1;
                continue;
            }
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(err) => {
                warn!("Not valid JSON, skipping {}: {}", path.display(), err);
                stats.parse_errors += 1;
                continue;
            }
        };

        // Exports ship both a combined array and per-conversation documents.
        let records: Vec<Value> = match value {
            Value::Array(items) => items,
            object @ Value::Object(_) => vec![object],
            _ => {
                warn!("Unexpected document shape in {}", path.display());
                stats.parse_errors += 1;
                continue;
            }
        };

        for record in records {
            match parse_record(record) {
                Ok(Some(loaded)) => merge(&mut by_id, loaded, &mut stats),
                Ok(None) => stats.empty_dropped += 1,
                Err(err) => {
                    debug!("Conversation parse error in {}: {}", path.display(), err);
                    stats.parse_errors += 1;
                }
            }
        }
    }

    let mut conversations: Vec<LoadedConversation> = by_id.into_values().collect();
    conversations.sort_by(|a, b| a.id.cmp(&b.id));
    (conversations, stats)
}

/// Candidate documents: the canonical `conversations.json` plus any JSON
/// file advertising itself as conversation data.
fn discover_documents(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if name == "conversations.json"
                || (is_json && name.to_ascii_lowercase().contains("conversation"))
            {
                found.push(path);
            }
        }
    }
    found
}

/// Returns Ok(None) for records that parse but must be dropped: no usable
/// id, zero messages, or the null/epoch creation sentinel.
fn parse_record(value: Value) -> Result<Option<LoadedConversation>, serde_json::Error> {
    let mapping_value = value.get("mapping").cloned().unwrap_or(Value::Null);
    let raw: RawConversation = serde_json::from_value(value)?;

    let Some(id) = raw.canonical_id().map(str::to_string) else {
        debug!("Record without conversation id dropped");
        return Ok(None);
    };
    if raw.message_count() == 0 {
        debug!("Conversation {} has no messages, dropped", id);
        return Ok(None);
    }
    match raw.create_time {
        Some(t) if t > 0.0 => {}
        _ => {
            debug!("Conversation {} has null/epoch create_time, dropped", id);
            return Ok(None);
        }
    }

    Ok(Some(LoadedConversation {
        id,
        raw,
        mapping_value,
    }))
}

/// Keep the record with the most message-bearing nodes for each id.
fn merge(
    by_id: &mut HashMap<String, LoadedConversation>,
    incoming: LoadedConversation,
    stats: &mut LoadStats,
) {
    match by_id.get(&incoming.id) {
        Some(existing) if existing.raw.message_count() >= incoming.raw.message_count() => {
            stats.duplicates_dropped += 1;
        }
        Some(_) => {
            stats.duplicates_dropped += 1;
            by_id.insert(incoming.id.clone(), incoming);
        }
        None => {
            by_id.insert(incoming.id.clone(), incoming);
        }
    }
}
