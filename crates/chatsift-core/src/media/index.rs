use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::patterns::{self, MediaClass};
use super::walk::{self, MediaCandidate};

/// The indexed representation of one physical media file.
///
/// Created once by the indexer and immutable thereafter. Identifier fields
/// are populated purely syntactically from the filename and path.
#[derive(Debug, Clone)]
pub struct MediaFile {
    pub path: PathBuf,
    pub basename: String,
    pub size: u64,
    pub class: MediaClass,
    /// `file-{ID}` token when the filename carries one.
    pub file_id: Option<String>,
    /// 32-hex content hash when the filename matches `file_{hash}-{uuid}.{ext}`.
    pub content_hash: Option<String>,
    /// Conversation UUID from the nearest matching ancestor directory.
    pub conversation_id: Option<String>,
    /// Extension detected from magic bytes when it disagrees with the name.
    pub detected_ext: Option<&'static str>,
}

/// Read-only aggregation of lookup tables over all media files.
///
/// A single arena owns every `MediaFile`; the tables store indices into it,
/// which keeps the whole structure trivially shareable across resolution
/// workers. `(size, gen_id)` is not built here because generator ids live only in
/// conversation metadata, so the resolver finalizes that table.
#[derive(Debug, Default)]
pub struct MediaIndex {
    files: Vec<MediaFile>,
    by_conversation: HashMap<String, Vec<usize>>,
    by_file_id: HashMap<String, usize>,
    by_hash: HashMap<String, usize>,
    by_size: HashMap<u64, Vec<usize>>,
    by_name_size: HashMap<(String, u64), usize>,
    pub collisions: u64,
}

impl MediaIndex {
    /// Build the index over the extraction root plus any recovery roots.
    ///
    /// Roots are walked in order and candidates are inserted in sorted path
    /// order within each root, so unique-key collisions resolve to the
    /// lexicographically first in-archive file; recovery files never
    /// displace archive files.
    pub fn build(
        extraction_root: &Path,
        recovery_roots: &[&Path],
        ignore_patterns: &[String],
    ) -> io::Result<Self> {
        let mut index = MediaIndex::default();

        index.ingest_root(extraction_root, ignore_patterns)?;
        let archive_files = index.files.len();

        for root in recovery_roots {
            info!("Indexing recovery root: {}", root.display());
            index.ingest_root(root, ignore_patterns)?;
        }

        debug!(
            "Indexed {} media files ({} from archive, {} from recovery), {} collisions",
            index.files.len(),
            archive_files,
            index.files.len() - archive_files,
            index.collisions,
        );
        Ok(index)
    }

    fn ingest_root(&mut self, root: &Path, ignore_patterns: &[String]) -> io::Result<()> {
        let candidates = walk::collect_media_candidates(&[root], ignore_patterns)?;
        for candidate in candidates {
            self.insert(candidate);
        }
        Ok(())
    }

    fn insert(&mut self, candidate: MediaCandidate) {
        let MediaCandidate {
            path,
            size,
            class,
            detected_ext,
        } = candidate;

        let basename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => return,
        };

        let file = MediaFile {
            file_id: patterns::extract_file_id(&basename),
            content_hash: patterns::extract_content_hash(&basename),
            conversation_id: patterns::extract_conversation_id(&path),
            path,
            basename,
            size,
            class,
            detected_ext,
        };
        let idx = self.files.len();

        if let Some(conv_id) = &file.conversation_id {
            self.by_conversation
                .entry(conv_id.clone())
                .or_default()
                .push(idx);
        }
        if let Some(file_id) = &file.file_id {
            if self.by_file_id.contains_key(file_id) {
                self.collisions += 1;
            } else {
                self.by_file_id.insert(file_id.clone(), idx);
            }
        }
        if let Some(hash) = &file.content_hash {
            if self.by_hash.contains_key(hash) {
                self.collisions += 1;
            } else {
                self.by_hash.insert(hash.clone(), idx);
            }
        }
        self.by_size.entry(file.size).or_default().push(idx);

        let name_size_key = (file.basename.clone(), file.size);
        if self.by_name_size.contains_key(&name_size_key) {
            self.collisions += 1;
        } else {
            self.by_name_size.insert(name_size_key, idx);
        }

        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn file(&self, idx: usize) -> &MediaFile {
        &self.files[idx]
    }

    pub fn files(&self) -> &[MediaFile] {
        &self.files
    }

    pub fn lookup_hash(&self, hash: &str) -> Option<usize> {
        self.by_hash.get(hash).copied()
    }

    pub fn lookup_file_id(&self, file_id: &str) -> Option<usize> {
        self.by_file_id.get(file_id).copied()
    }

    pub fn lookup_name_size(&self, name: &str, size: u64) -> Option<usize> {
        self.by_name_size.get(&(name.to_string(), size)).copied()
    }

    pub fn lookup_conversation(&self, conversation_id: &str) -> &[usize] {
        self.by_conversation
            .get(conversation_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn lookup_size(&self, size: u64) -> &[usize] {
        self.by_size
            .get(&size)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }
}
