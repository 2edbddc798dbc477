use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// The OpenAI export shape, as loosely as we need it. Unknown metadata stays
/// as raw `Value` so nothing the export carries is lost before output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConversation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub current_node: Option<String>,
    #[serde(default)]
    pub mapping: HashMap<String, MappingNode>,
}

impl RawConversation {
    pub fn canonical_id(&self) -> Option<&str> {
        self.conversation_id.as_deref().or(self.id.as_deref())
    }

    /// Message-bearing nodes, the count used for dedup tie-breaking.
    pub fn message_count(&self) -> usize {
        self.mapping
            .values()
            .filter(|node| node.message.is_some())
            .count()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingNode {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub message: Option<RawMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub author: Option<Author>,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub content: Option<MessageContent>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageContent {
    #[serde(default)]
    pub content_type: Option<String>,
    /// Parts are strings for text content and objects for asset pointers.
    #[serde(default)]
    pub parts: Option<Vec<Value>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

/// One conversation as loaded from disk: typed skeleton for traversal plus
/// the original `mapping` value retained verbatim for output.
#[derive(Debug, Clone)]
pub struct LoadedConversation {
    pub id: String,
    pub raw: RawConversation,
    pub mapping_value: Value,
}

/// Flat message view produced by linearization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: String,
    pub role: String,
    #[serde(default)]
    pub create_time: Option<f64>,
    pub text: String,
}

/// The record written to each conversation folder. `media` holds on-disk
/// names (post-copy), `mapping` the original branching map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub conversation_id: String,
    pub title: String,
    #[serde(default)]
    pub create_time: Option<f64>,
    #[serde(default)]
    pub update_time: Option<f64>,
    pub messages: Vec<MessageView>,
    pub mapping: Value,
    #[serde(default)]
    pub media: Vec<String>,
    #[serde(default)]
    pub unresolved: Vec<UnresolvedRef>,
    #[serde(default)]
    pub assets: Vec<String>,
}

/// A citation no strategy could bind, surfaced rather than synthesized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedRef {
    pub kind: String,
    pub payload: String,
}
