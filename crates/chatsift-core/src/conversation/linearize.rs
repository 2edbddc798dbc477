use std::collections::HashSet;

use super::model::{MessageView, RawConversation, RawMessage};

/// Produce the ordered flat message view of a conversation.
///
/// Prefers the `current_node` parent-chain when it resolves; otherwise walks
/// depth-first from the root with children ordered by message creation
/// timestamp. A visited set guards against cyclic or self-referential
/// mappings, which real exports do contain.
pub fn linearize(conv: &RawConversation) -> Vec<MessageView> {
    let node_ids = match current_node_chain(conv) {
        Some(chain) => chain,
        None => tree_order(conv),
    };

    node_ids
        .iter()
        .filter_map(|node_id| {
            let node = conv.mapping.get(node_id)?;
            let message = node.message.as_ref()?;
            Some(view_of(node_id, message))
        })
        .collect()
}

fn current_node_chain(conv: &RawConversation) -> Option<Vec<String>> {
    let current = conv.current_node.as_deref()?;
    if !conv.mapping.contains_key(current) {
        return None;
    }

    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut cursor = Some(current.to_string());

    while let Some(node_id) = cursor {
        if !visited.insert(node_id.clone()) {
            break;
        }
        cursor = conv
            .mapping
            .get(&node_id)
            .and_then(|node| node.parent.clone());
        chain.push(node_id);
    }

    chain.reverse();
    Some(chain)
}

fn tree_order(conv: &RawConversation) -> Vec<String> {
    // Roots: nodes whose parent is absent or dangling. Sorted for stable
    // output when the mapping is fragmented.
    let mut roots: Vec<&String> = conv
        .mapping
        .iter()
        .filter(|(_, node)| {
            node.parent
                .as_ref()
                .map(|p| !conv.mapping.contains_key(p))
                .unwrap_or(true)
        })
        .map(|(id, _)| id)
        .collect();
    roots.sort();

    let mut order = Vec::new();
    let mut visited = HashSet::new();
    for root in roots {
        walk(conv, root, &mut visited, &mut order);
    }
    order
}

fn walk(
    conv: &RawConversation,
    node_id: &str,
    visited: &mut HashSet<String>,
    order: &mut Vec<String>,
) {
    if !visited.insert(node_id.to_string()) {
        return;
    }
    order.push(node_id.to_string());

    let Some(node) = conv.mapping.get(node_id) else {
        return;
    };

    let mut children: Vec<&String> = node
        .children
        .iter()
        .filter(|c| conv.mapping.contains_key(*c))
        .collect();
    children.sort_by(|a, b| {
        let ta = child_create_time(conv, a);
        let tb = child_create_time(conv, b);
        ta.partial_cmp(&tb)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cmp(b))
    });

    for child in children {
        walk(conv, child, visited, order);
    }
}

fn child_create_time(conv: &RawConversation, node_id: &str) -> f64 {
    conv.mapping
        .get(node_id)
        .and_then(|node| node.message.as_ref())
        .and_then(|message| message.create_time)
        .unwrap_or(f64::MAX)
}

fn view_of(node_id: &str, message: &RawMessage) -> MessageView {
    let role = message
        .author
        .as_ref()
        .and_then(|a| a.role.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let text = message
        .content
        .as_ref()
        .map(|content| {
            if let Some(text) = &content.text {
                text.clone()
            } else {
                content
                    .parts
                    .as_deref()
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(|part| part.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        })
        .unwrap_or_default();

    MessageView {
        id: message
            .id
            .clone()
            .unwrap_or_else(|| node_id.to_string()),
        role,
        create_time: message.create_time,
        text,
    }
}
