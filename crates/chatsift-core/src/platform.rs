use std::io;
use std::path::Path;

/// Create a relative symlink at `link` pointing to `target`.
///
/// The `_with_media/` and `_with_assets/` convenience folders are built from
/// these. On platforms without cheap symlinks the link is skipped; the
/// canonical folders are unaffected.
#[cfg(unix)]
pub fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    // Directory symlinks require elevation on most Windows setups.
    match std::os::windows::fs::symlink_dir(target, link) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::warn!(
                "Could not create link {} -> {}: {}",
                link.display(),
                target.display(),
                err
            );
            Ok(())
        }
    }
}

#[cfg(not(any(unix, windows)))]
pub fn symlink_dir(_target: &Path, _link: &Path) -> io::Result<()> {
    Ok(())
}
