use chrono::DateTime;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;

use crate::media::MediaFile;

static UNSAFE_CHARS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap());
static UNDERSCORE_RUNS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"_+").unwrap());

const MAX_SLUG_LEN: usize = 50;

/// Convert a conversation title to a safe folder-name component.
pub fn slugify(title: &str) -> String {
    let name = title.replace(' ', "_");
    let name = UNSAFE_CHARS.replace_all(&name, "");
    let name = UNDERSCORE_RUNS.replace_all(&name, "_");

    let mut slug: String = name.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug = "untitled".to_string();
    }
    slug
}

/// Unix seconds to the `YYYY-MM-DD` folder prefix. The zero date marks
/// records whose timestamp did not parse (loader drops true epoch records
/// before this point).
pub fn date_string(create_time: Option<f64>) -> String {
    match create_time {
        Some(secs) if secs > 0.0 => DateTime::from_timestamp(secs as i64, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "0000-00-00".to_string()),
        _ => "0000-00-00".to_string(),
    }
}

/// `{yyyy-mm-dd}_{slug}_{5-digit-ordinal}`
pub fn folder_name(create_time: Option<f64>, title: &str, ordinal: usize) -> String {
    format!(
        "{}_{}_{:05}",
        date_string(create_time),
        slugify(title),
        ordinal
    )
}

/// Full SHA-256 of a file's content, lowercase hex.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// On-disk name for a media copy: `{hash8}_{basename}`, with the basename's
/// `.dat` suffix (or missing extension) corrected to the magic-detected
/// extension. The source file is never renamed in place.
pub fn copy_name(file: &MediaFile, digest: &str) -> String {
    let hash8 = &digest[..8.min(digest.len())];
    let basename = match file.detected_ext {
        Some(ext) => {
            let name = &file.basename;
            match name.rsplit_once('.') {
                Some((stem, old)) if old.eq_ignore_ascii_case("dat") => {
                    format!("{}.{}", stem, ext)
                }
                Some(_) => name.clone(),
                None => format!("{}.{}", name, ext),
            }
        }
        None => file.basename.clone(),
    };
    format!("{}_{}", hash8, basename)
}
