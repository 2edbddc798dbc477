use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::error::Error;

/// Outcome of the recursive extraction phase.
#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub archives_extracted: usize,
    pub archives_skipped: usize,
    pub entries_recovered: usize,
}

/// Recursively unpack `root_archive` into `dest`, then every nested archive
/// in place (`{archive}_unzipped` next to it). A hard failure at the root is
/// fatal; a hard failure on a nested archive is logged and skipped.
pub fn extract_recursive(
    root_archive: &Path,
    dest: &Path,
    external_timeout: Duration,
    cancel: &AtomicBool,
    mut on_progress: impl FnMut(usize, &str),
) -> Result<ExtractionReport, Error> {
    if !root_archive.is_file() {
        return Err(Error::InvalidInput(format!(
            "archive not found: {}",
            root_archive.display()
        )));
    }
    if !is_archive(root_archive) {
        return Err(Error::InvalidInput(format!(
            "not a zip archive: {}",
            root_archive.display()
        )));
    }

    let mut report = ExtractionReport::default();
    let mut queue: VecDeque<(PathBuf, PathBuf)> = VecDeque::new();
    queue.push_back((root_archive.to_path_buf(), dest.to_path_buf()));
    let mut is_root = true;

    while let Some((archive, out_dir)) = queue.pop_front() {
        if cancel.load(Ordering::Relaxed) {
            return Err(Error::Cancelled);
        }

        on_progress(report.archives_extracted, &archive.display().to_string());

        match extract_one(&archive, &out_dir, external_timeout) {
            Ok(recovered) => {
                debug!(
                    "Extracted {} ({} entries) -> {}",
                    archive.display(),
                    recovered,
                    out_dir.display()
                );
                report.archives_extracted += 1;
                report.entries_recovered += recovered;
                enqueue_nested(&out_dir, &mut queue);
            }
            Err(err) if is_root => {
                warn!("Root archive unrecoverable: {}", err);
                return Err(Error::ArchiveMalformed(archive));
            }
            Err(err) => {
                warn!("Skipping nested archive {}: {}", archive.display(), err);
                report.archives_skipped += 1;
            }
        }
        is_root = false;
    }

    info!(
        "Extraction complete: {} archives, {} entries, {} skipped",
        report.archives_extracted, report.entries_recovered, report.archives_skipped
    );
    Ok(report)
}

/// An archive for queueing purposes: `.zip` extension or local-file-header
/// magic. Extension alone is not trusted (exports contain renamed blobs),
/// magic alone is enough.
pub fn is_archive(path: &Path) -> bool {
    let by_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);
    if by_ext {
        return true;
    }

    let mut head = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read(&mut head)) {
        Ok(n) if n >= 4 => head == [0x50, 0x4B, 0x03, 0x04],
        _ => false,
    }
}

/// Extract one archive, tolerating malformed headers.
///
/// In-process extraction recovers entry-by-entry; if nothing at all is
/// recovered, fall back to the system `unzip`, which accepts archives the
/// zip crate rejects. Returns the number of entries recovered.
fn extract_one(archive: &Path, out_dir: &Path, external_timeout: Duration) -> io::Result<usize> {
    fs::create_dir_all(out_dir)?;

    let in_process = extract_in_process(archive, out_dir);
    match in_process {
        Ok(recovered) if recovered > 0 => return Ok(recovered),
        Ok(_) => debug!("In-process extraction recovered nothing: {}", archive.display()),
        Err(err) => debug!(
            "In-process extraction failed for {}: {}",
            archive.display(),
            err
        ),
    }

    extract_with_system_unzip(archive, out_dir, external_timeout)?;
    let recovered = count_entries(out_dir);
    if recovered == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "no entries recovered by any extractor",
        ));
    }
    Ok(recovered)
}

fn extract_in_process(archive: &Path, out_dir: &Path) -> io::Result<usize> {
    let file = File::open(archive)?;
    let mut zip = ZipArchive::new(file)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    let mut recovered = 0usize;
    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(entry) => entry,
            Err(err) => {
                debug!("Bad entry {} in {}: {}", i, archive.display(), err);
                continue;
            }
        };

        // enclosed_name rejects absolute and parent-escaping entry paths.
        let rel = match entry.enclosed_name() {
            Some(rel) => rel.to_path_buf(),
            None => {
                debug!("Unsafe entry name in {}, skipped", archive.display());
                continue;
            }
        };
        let target = out_dir.join(rel);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = match File::create(&target) {
            Ok(out) => out,
            Err(err) => {
                debug!("Cannot create {}: {}", target.display(), err);
                continue;
            }
        };
        match io::copy(&mut entry, &mut out) {
            Ok(_) => recovered += 1,
            Err(err) => {
                debug!("Truncated entry {}: {}", target.display(), err);
                let _ = fs::remove_file(&target);
            }
        }
    }
    Ok(recovered)
}

/// Permissive command-line unpacker fallback, with a per-call deadline.
/// `unzip` exits non-zero on warnings while still extracting; the caller
/// decides success by counting what landed on disk.
fn extract_with_system_unzip(
    archive: &Path,
    out_dir: &Path,
    timeout: Duration,
) -> io::Result<()> {
    let mut child = Command::new("unzip")
        .arg("-q")
        .arg("-o")
        .arg(archive)
        .arg("-d")
        .arg(out_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let started = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => {
                debug!("system unzip exited with {} for {}", status, archive.display());
                return Ok(());
            }
            None if started.elapsed() > timeout => {
                warn!(
                    "system unzip exceeded {:?} for {}, killing",
                    timeout,
                    archive.display()
                );
                let _ = child.kill();
                let _ = child.wait();
                return Err(io::Error::new(io::ErrorKind::TimedOut, "unzip deadline exceeded"));
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

fn count_entries(dir: &Path) -> usize {
    let mut count = 0;
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                count += count_entries(&path);
            } else {
                count += 1;
            }
        }
    }
    count
}

/// Scan a freshly extracted directory for nested archives and enqueue them,
/// each unpacking next to itself.
fn enqueue_nested(dir: &Path, queue: &mut VecDeque<(PathBuf, PathBuf)>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            // Skip output dirs of archives we already unpacked.
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_unzipped"))
                .unwrap_or(false)
            {
                continue;
            }
            enqueue_nested(&path, queue);
        } else if is_archive(&path) {
            let mut out = path.as_os_str().to_owned();
            out.push("_unzipped");
            queue.push_back((path, PathBuf::from(out)));
        }
    }
}
