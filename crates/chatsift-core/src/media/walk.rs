use dashmap::DashMap;
use glob::Pattern;
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::error;

use super::patterns::{self, MediaClass};

/// One media-like file found during the walk, before index insertion.
#[derive(Debug, Clone)]
pub struct MediaCandidate {
    pub path: PathBuf,
    pub size: u64,
    pub class: MediaClass,
    /// Extension detected from magic bytes when the filename lies
    /// (`.dat` payloads, extensionless blobs). Used at copy time only.
    pub detected_ext: Option<&'static str>,
}

/// Parallel directory traversal. Collects every media-like file under the
/// given roots, filtering by glob ignore patterns. Skips symlinks and
/// 0-byte files. The result is sorted lexicographically by path so the
/// caller's index insertion is deterministic regardless of worker count.
pub fn collect_media_candidates(
    roots: &[&Path],
    ignore_globs: &[String],
) -> io::Result<Vec<MediaCandidate>> {
    let map: DashMap<PathBuf, MediaCandidate> = DashMap::new();

    let ignore_patterns: Vec<Pattern> = ignore_globs
        .iter()
        .filter_map(|glob| match Pattern::new(glob) {
            Ok(p) => Some(p),
            Err(e) => {
                error!("Invalid glob pattern '{}': {}", glob, e);
                None
            }
        })
        .collect();

    roots
        .par_iter()
        .try_for_each(|root| visit_dirs(root, &map, &ignore_patterns))?;

    let mut candidates: Vec<MediaCandidate> = map.into_iter().map(|(_, v)| v).collect();
    candidates.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(candidates)
}

fn visit_dirs(
    dir: &Path,
    map: &DashMap<PathBuf, MediaCandidate>,
    ignore_patterns: &[Pattern],
) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    if ignore_patterns
        .iter()
        .any(|pattern| pattern.matches_path(dir))
    {
        return Ok(());
    }

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            if err.kind() == io::ErrorKind::PermissionDenied {
                error!("Access denied reading directory {}: {}", dir.display(), err);
                return Ok(());
            } else {
                return Err(io::Error::new(
                    err.kind(),
                    format!("Error reading directory {}: {}", dir.display(), err),
                ));
            }
        }
    };

    entries.par_bridge().try_for_each(|entry_result| {
        let entry = entry_result.map_err(|err| {
            io::Error::new(
                err.kind(),
                format!("Error reading entry in directory {}: {}", dir.display(), err),
            )
        })?;

        let path = entry.path();
        if path.is_dir() {
            visit_dirs(&path, map, ignore_patterns)?;
            return Ok(());
        }

        let metadata = match fs::symlink_metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) => {
                error!("Error getting metadata for {}: {}", path.display(), err);
                return Ok(());
            }
        };

        if metadata.file_type().is_symlink() || metadata.len() == 0 {
            return Ok(());
        }
        if ignore_patterns
            .iter()
            .any(|pattern| pattern.matches_path(&path))
        {
            return Ok(());
        }

        if let Some(candidate) = classify(&path, metadata.len()) {
            map.insert(path.clone(), candidate);
        }
        Ok::<_, io::Error>(())
    })?;

    Ok(())
}

/// Decide whether a file belongs in the media index.
///
/// Extension membership is authoritative; files the extension set does not
/// cover are admitted only when their magic bytes identify a known media
/// container.
fn classify(path: &Path, size: u64) -> Option<MediaCandidate> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("dat") => {
            let sniffed = sniff_head(path);
            Some(MediaCandidate {
                path: path.to_path_buf(),
                size,
                class: sniffed.map(|(_, c)| c).unwrap_or(MediaClass::Other),
                detected_ext: sniffed.map(|(e, _)| e),
            })
        }
        Some(e) if patterns::is_media_extension(e) => Some(MediaCandidate {
            path: path.to_path_buf(),
            size,
            class: patterns::class_for_extension(e),
            detected_ext: None,
        }),
        // Unknown or missing extension: admit only when the magic bytes
        // identify a known media container.
        _ => {
            let (detected, class) = sniff_head(path)?;
            Some(MediaCandidate {
                path: path.to_path_buf(),
                size,
                class,
                detected_ext: Some(detected),
            })
        }
    }
}

fn sniff_head(path: &Path) -> Option<(&'static str, MediaClass)> {
    let mut head = [0u8; 16];
    let mut file = File::open(path).ok()?;
    let n = file.read(&mut head).ok()?;
    patterns::sniff_magic(&head[..n])
}
