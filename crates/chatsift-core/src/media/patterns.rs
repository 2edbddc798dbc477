use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

// Filename patterns (compiled once via LazyLock)

/// `file-{ID}_…` or `file-{ID}-…`: the id is everything before the first
/// separator after the literal `file-`. Anchored, so interior `file-…` does
/// not match.
static FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(file-[A-Za-z0-9]+)[_-]").unwrap());

/// `file_{32-hex}-{uuid-36}.{ext}`: the 32-hex segment is the content hash.
static FILE_HASH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^file_([0-9a-f]{32})-[0-9a-f-]{36}\.").unwrap());

/// Canonical 8-4-4-4-12 hex UUID, whole string.
static UUID_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Legacy 8-4-4-4-8 form seen in old exports, only honored under a
/// `conversations/` path segment.
static LEGACY_UUID_DIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{8}$").unwrap()
});

// Free-text patterns

pub static TEXT_FILE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"file-[A-Za-z0-9]+").unwrap());

pub static TEXT_UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

pub static TEXT_FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)[\w\-]+\.(?:png|jpe?g|gif|webp|bmp|tiff|svg|pdf|mp3|wav|m4a|ogg|flac|mp4|mov|avi|mkv|webm)",
    )
    .unwrap()
});

const MEDIA_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "tiff", "svg", "pdf", "mp3", "wav", "m4a", "ogg",
    "flac", "mp4", "mov", "avi", "mkv", "webm", "dat",
];

/// MIME class of an indexed file, derived from extension or magic bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Image,
    Audio,
    Document,
    Other,
}

pub fn is_media_extension(ext: &str) -> bool {
    MEDIA_EXTENSIONS.contains(&ext)
}

pub fn class_for_extension(ext: &str) -> MediaClass {
    match ext {
        "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" | "tiff" | "svg" => MediaClass::Image,
        "mp3" | "wav" | "m4a" | "ogg" | "flac" => MediaClass::Audio,
        "pdf" => MediaClass::Document,
        _ => MediaClass::Other,
    }
}

/// Identify a known media container from leading magic bytes.
/// Returns the conventional extension for the detected format.
pub fn sniff_magic(head: &[u8]) -> Option<(&'static str, MediaClass)> {
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(("png", MediaClass::Image));
    }
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(("jpg", MediaClass::Image));
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(("gif", MediaClass::Image));
    }
    if head.starts_with(b"BM") {
        return Some(("bmp", MediaClass::Image));
    }
    if head.len() >= 12 && head.starts_with(b"RIFF") {
        if &head[8..12] == b"WEBP" {
            return Some(("webp", MediaClass::Image));
        }
        if &head[8..12] == b"WAVE" {
            return Some(("wav", MediaClass::Audio));
        }
    }
    if head.starts_with(b"ID3") || head.starts_with(&[0xFF, 0xFB]) {
        return Some(("mp3", MediaClass::Audio));
    }
    if head.starts_with(b"OggS") {
        return Some(("ogg", MediaClass::Audio));
    }
    if head.starts_with(b"%PDF") {
        return Some(("pdf", MediaClass::Document));
    }
    None
}

/// Extract the file-id token from a filename of form `file-{ID}_…` / `file-{ID}-…`.
pub fn extract_file_id(filename: &str) -> Option<String> {
    FILE_ID_RE
        .captures(filename)
        .map(|c| c.get(1).unwrap().as_str().to_string())
}

/// Extract the 32-hex content hash from a `file_{hash}-{uuid}.{ext}` filename.
pub fn extract_content_hash(filename: &str) -> Option<String> {
    FILE_HASH_RE
        .captures(filename)
        .map(|c| c.get(1).unwrap().as_str().to_string())
}

/// Conversation-id from a file path: the nearest ancestor directory named as
/// a canonical UUID wins. The legacy 8-4-4-4-8 form is accepted only when
/// its parent component is `conversations`.
pub fn extract_conversation_id(path: &Path) -> Option<String> {
    let mut prev: Option<&str> = None;
    for component in path.parent()?.components().rev() {
        let name = component.as_os_str().to_str()?;
        if UUID_DIR_RE.is_match(name) {
            return Some(name.to_string());
        }
        if LEGACY_UUID_DIR_RE.is_match(name) {
            // The parent of this component is the next one in the reversed
            // walk; peek by continuing and remembering what we saw.
            prev = Some(name);
            continue;
        }
        if name == "conversations" {
            if let Some(id) = prev {
                return Some(id.to_string());
            }
        }
        prev = None;
    }
    None
}
