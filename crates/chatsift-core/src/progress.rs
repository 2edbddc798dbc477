/// Trait for reporting pipeline progress.
///
/// CLI implements with indicatif spinners/bars.
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_extract_start(&self) {}
    fn on_extract_progress(&self, _archives_done: usize, _current: &str) {}
    fn on_extract_complete(&self, _archives: usize, _duration_secs: f64) {}
    fn on_index_start(&self) {}
    fn on_index_progress(&self, _files_found: usize) {}
    fn on_index_complete(&self, _files_indexed: usize, _duration_secs: f64) {}
    fn on_load_start(&self) {}
    fn on_load_complete(&self, _conversations: usize, _dropped: usize, _duration_secs: f64) {}
    fn on_resolve_start(&self) {}
    fn on_resolve_progress(&self, _conversations_done: usize, _total: usize) {}
    fn on_resolve_complete(&self, _resolved: usize, _unresolved: usize, _duration_secs: f64) {}
    fn on_write_start(&self) {}
    fn on_write_progress(&self, _conversations_written: usize, _total: usize) {}
    fn on_write_complete(&self, _folders: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
