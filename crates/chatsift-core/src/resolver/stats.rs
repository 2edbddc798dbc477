use serde::Serialize;
use std::collections::BTreeMap;

const MAX_UNRESOLVED_EXAMPLES: usize = 10;

/// Global resolution statistics, embedded in the master index and printed
/// in verbose mode. Maps are ordered so the serialized form is stable.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ResolverStats {
    pub citations_total: u64,
    pub citations_by_kind: BTreeMap<String, u64>,
    pub resolved_by_strategy: BTreeMap<String, u64>,
    pub unresolved_citations: u64,
    pub conversations_with_media: u64,
    pub unresolved_examples: Vec<UnresolvedExample>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedExample {
    pub kind: String,
    pub payload: String,
}

impl ResolverStats {
    pub fn count_citation(&mut self, kind: &str) {
        self.citations_total += 1;
        *self.citations_by_kind.entry(kind.to_string()).or_default() += 1;
    }

    pub fn count_resolution(&mut self, strategy: &str) {
        *self
            .resolved_by_strategy
            .entry(strategy.to_string())
            .or_default() += 1;
    }

    pub fn count_unresolved(&mut self, kind: &str, payload: &str) {
        self.unresolved_citations += 1;
        if self.unresolved_examples.len() < MAX_UNRESOLVED_EXAMPLES {
            self.unresolved_examples.push(UnresolvedExample {
                kind: kind.to_string(),
                payload: payload.to_string(),
            });
        }
    }

    /// Fold per-conversation deltas into the global tally. Conversations are
    /// merged in worklist order, so example selection is deterministic.
    pub fn merge(&mut self, other: ResolverStats) {
        self.citations_total += other.citations_total;
        for (kind, count) in other.citations_by_kind {
            *self.citations_by_kind.entry(kind).or_default() += count;
        }
        for (strategy, count) in other.resolved_by_strategy {
            *self.resolved_by_strategy.entry(strategy).or_default() += count;
        }
        self.unresolved_citations += other.unresolved_citations;
        self.conversations_with_media += other.conversations_with_media;
        for example in other.unresolved_examples {
            if self.unresolved_examples.len() >= MAX_UNRESOLVED_EXAMPLES {
                break;
            }
            self.unresolved_examples.push(example);
        }
    }
}
