pub mod stats;

pub use stats::ResolverStats;

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::conversation::model::UnresolvedRef;
use crate::media::MediaIndex;
use crate::references::{Citation, CitationKind};

/// The matching strategies, in the order they are tried. A stronger match
/// never loses to a weaker one because the dispatch loop walks this order
/// and stops at the first hit. `rematch-media` replays the same table, so
/// alternative orderings stay a one-line experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    HashMatch,
    FileIdMatch,
    NameSizeMatch,
    ConversationDir,
    SizeGenId,
    SizeOnly,
    InlineText,
}

impl Strategy {
    pub const ORDER: [Strategy; 7] = [
        Strategy::HashMatch,
        Strategy::FileIdMatch,
        Strategy::NameSizeMatch,
        Strategy::ConversationDir,
        Strategy::SizeGenId,
        Strategy::SizeOnly,
        Strategy::InlineText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::HashMatch => "file_hash",
            Strategy::FileIdMatch => "file_id",
            Strategy::NameSizeMatch => "name_size",
            Strategy::ConversationDir => "conversation_dir",
            Strategy::SizeGenId => "size_gen_id",
            Strategy::SizeOnly => "size_only",
            Strategy::InlineText => "inline_text",
        }
    }
}

/// What one strategy produced for one citation.
enum Hit {
    /// A single file bound to the citation.
    One(usize),
    /// The whole conversation-directory set (strategy 4).
    Set(Vec<usize>),
    Miss,
}

/// Per-conversation resolution result. File indices point into the shared
/// `MediaIndex` arena; ordering for output happens at write time.
#[derive(Debug, Default)]
pub struct ConversationResolution {
    pub media: Vec<usize>,
    pub unresolved: Vec<UnresolvedRef>,
    /// Citation token -> bound file, for the per-conversation manifest.
    pub manifest: Vec<(String, usize)>,
    pub stats: ResolverStats,
}

/// Resolves citations against a frozen `MediaIndex`. Construction runs the
/// cooperative first pass that finalizes the `(size, gen_id)` table, which
/// the indexer cannot build alone because generator ids live only in
/// conversation metadata.
pub struct Resolver<'a> {
    index: &'a MediaIndex,
    by_size_and_gen_id: HashMap<(u64, String), usize>,
}

impl<'a> Resolver<'a> {
    /// `citation_sets` must be ordered by conversation-id; gen-id pairing
    /// depends on first-appearance order for determinism.
    pub fn new(index: &'a MediaIndex, citation_sets: &[Vec<Citation>]) -> Self {
        let by_size_and_gen_id = build_size_gen_table(index, citation_sets);
        Self {
            index,
            by_size_and_gen_id,
        }
    }

    pub fn resolve_conversation(
        &self,
        conversation_id: &str,
        citations: &[Citation],
    ) -> ConversationResolution {
        let mut result = ConversationResolution::default();
        let mut seen_files: HashSet<usize> = HashSet::new();

        // Strategy-4 guard: only conversations that actually cite service
        // assets may swallow their conversation directory.
        let has_service_citation = citations.iter().any(|c| {
            matches!(
                c.kind,
                CitationKind::FileServicePointer | CitationKind::DalleAsset
            )
        });

        for citation in citations {
            result.stats.count_citation(citation.kind.as_str());

            let mut winner: Option<Strategy> = None;
            for strategy in Strategy::ORDER {
                match self.apply(strategy, citation, has_service_citation) {
                    Hit::One(file_idx) => {
                        attach(&mut result.media, &mut seen_files, file_idx);
                        result.manifest.push((citation.payload.clone(), file_idx));
                        if let Some(name) = &citation.name {
                            if name != &citation.payload {
                                result.manifest.push((name.clone(), file_idx));
                            }
                        }
                        winner = Some(strategy);
                        break;
                    }
                    Hit::Set(file_indices) => {
                        for file_idx in file_indices {
                            attach(&mut result.media, &mut seen_files, file_idx);
                        }
                        winner = Some(strategy);
                        break;
                    }
                    Hit::Miss => {}
                }
            }

            match winner {
                Some(strategy) => {
                    result.stats.count_resolution(strategy.as_str());
                    debug!(
                        "{}: {} resolved by {}",
                        conversation_id,
                        citation.payload,
                        strategy.as_str()
                    );
                }
                None => {
                    result.stats.count_unresolved(citation.kind.as_str(), &citation.payload);
                    result.unresolved.push(UnresolvedRef {
                        kind: citation.kind.as_str().to_string(),
                        payload: citation.payload.clone(),
                    });
                }
            }
        }

        if !result.media.is_empty() {
            result.stats.conversations_with_media = 1;
        }
        result
    }

    fn apply(&self, strategy: Strategy, citation: &Citation, has_service_citation: bool) -> Hit {
        match strategy {
            Strategy::HashMatch => {
                if citation.kind != CitationKind::SedimentPointer {
                    return Hit::Miss;
                }
                one_or_miss(self.index.lookup_hash(&citation.payload))
            }
            Strategy::FileIdMatch => {
                let eligible = matches!(
                    citation.kind,
                    CitationKind::FileIdAttachment
                        | CitationKind::FileServicePointer
                        | CitationKind::DalleAsset
                        | CitationKind::InlineFileId
                );
                if !eligible {
                    return Hit::Miss;
                }
                one_or_miss(self.index.lookup_file_id(&citation.payload))
            }
            Strategy::NameSizeMatch => {
                let (Some(name), Some(size)) = (&citation.name, citation.size) else {
                    return Hit::Miss;
                };
                one_or_miss(self.index.lookup_name_size(name, size))
            }
            Strategy::ConversationDir => {
                if !has_service_citation {
                    return Hit::Miss;
                }
                let mut file_indices = self
                    .index
                    .lookup_conversation(&citation.conversation_id)
                    .to_vec();
                if file_indices.is_empty() {
                    return Hit::Miss;
                }
                // Reproducible attachment order regardless of walk order.
                file_indices.sort_by(|&a, &b| {
                    self.index.file(a).path.cmp(&self.index.file(b).path)
                });
                Hit::Set(file_indices)
            }
            Strategy::SizeGenId => {
                let (Some(size), Some(gen_id)) = (citation.size, &citation.gen_id) else {
                    return Hit::Miss;
                };
                one_or_miss(
                    self.by_size_and_gen_id
                        .get(&(size, gen_id.clone()))
                        .copied(),
                )
            }
            Strategy::SizeOnly => {
                let Some(size) = citation.size else {
                    return Hit::Miss;
                };
                match self.index.lookup_size(size) {
                    [only] => Hit::One(*only),
                    // Multiple candidates: decline rather than guess.
                    _ => Hit::Miss,
                }
            }
            Strategy::InlineText => {
                if !matches!(
                    citation.kind,
                    CitationKind::InlineName | CitationKind::InlineUuid
                ) {
                    return Hit::Miss;
                }
                let mut matches = self
                    .index
                    .files()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| f.basename.contains(citation.payload.as_str()));
                match (matches.next(), matches.next()) {
                    (Some((only, _)), None) => Hit::One(only),
                    _ => Hit::Miss,
                }
            }
        }
    }
}

fn one_or_miss(found: Option<usize>) -> Hit {
    match found {
        Some(idx) => Hit::One(idx),
        None => Hit::Miss,
    }
}

fn attach(media: &mut Vec<usize>, seen: &mut HashSet<usize>, file_idx: usize) {
    if seen.insert(file_idx) {
        media.push(file_idx);
    }
}

/// First pass of strategy 5. Distinct gen-ids citing a size are paired with
/// that size's files by zipping first-appearance order against index
/// (lexicographic-path) order: distinct gen-ids therefore never alias to
/// one file while another candidate of the same size goes unclaimed.
fn build_size_gen_table(
    index: &MediaIndex,
    citation_sets: &[Vec<Citation>],
) -> HashMap<(u64, String), usize> {
    let mut gen_ids_by_size: HashMap<u64, Vec<String>> = HashMap::new();

    for citations in citation_sets {
        for citation in citations {
            let (Some(size), Some(gen_id)) = (citation.size, &citation.gen_id) else {
                continue;
            };
            if index.lookup_size(size).is_empty() {
                continue;
            }
            let gen_ids = gen_ids_by_size.entry(size).or_default();
            if !gen_ids.contains(gen_id) {
                gen_ids.push(gen_id.clone());
            }
        }
    }

    let mut table = HashMap::new();
    for (size, gen_ids) in gen_ids_by_size {
        let files = index.lookup_size(size);
        for (gen_id, &file_idx) in gen_ids.into_iter().zip(files.iter()) {
            table.insert((size, gen_id), file_idx);
        }
    }
    table
}
