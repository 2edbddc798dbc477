use chatsift_core::ProgressReporter;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;

/// CLI progress reporter using indicatif.
///
/// - Extract phase: spinner (archive count unknown upfront)
/// - Index phase: spinner
/// - Resolve/write phases: progress bars (conversation total known)
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        let mut guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
    }

    fn spinner(&self, message: &'static str) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.set_message(message);
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn bar_progress(&self, done: usize, total: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            if pb.length() != Some(total as u64) {
                pb.set_length(total as u64);
            }
            pb.set_position(done as u64);
        }
    }

    fn start_bar(&self, verb: &'static str) {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(&format!(
                "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} conversations ({{eta}} remaining)",
                verb
            ))
            .unwrap()
            .progress_chars("━╸─")
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        pb.enable_steady_tick(std::time::Duration::from_millis(80));
        self.set_bar(pb);
    }
}

impl ProgressReporter for CliReporter {
    fn on_extract_start(&self) {
        self.spinner("Extracting archives...");
    }

    fn on_extract_progress(&self, archives_done: usize, _current: &str) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Extracting... {} archives unpacked", archives_done));
        }
    }

    fn on_extract_complete(&self, archives: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Extraction complete: {} archives in {:.2}s",
            archives, duration_secs
        );
    }

    fn on_index_start(&self) {
        self.spinner("Indexing media files...");
    }

    fn on_index_progress(&self, files_found: usize) {
        let guard = self.bar.lock().unwrap();
        if let Some(pb) = guard.as_ref() {
            pb.set_message(format!("Indexing... {} media files", files_found));
        }
    }

    fn on_index_complete(&self, files_indexed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Index complete: {} media files in {:.2}s",
            files_indexed, duration_secs
        );
    }

    fn on_load_start(&self) {
        self.spinner("Loading conversations...");
    }

    fn on_load_complete(&self, conversations: usize, dropped: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Load complete: {} conversations ({} dropped) in {:.2}s",
            conversations, dropped, duration_secs
        );
    }

    fn on_resolve_start(&self) {
        self.start_bar("Resolving");
    }

    fn on_resolve_progress(&self, conversations_done: usize, total: usize) {
        self.bar_progress(conversations_done, total);
    }

    fn on_resolve_complete(&self, resolved: usize, unresolved: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Resolution complete: {} citations matched, {} unresolved in {:.2}s",
            resolved, unresolved, duration_secs
        );
    }

    fn on_write_start(&self) {
        self.start_bar("Writing");
    }

    fn on_write_progress(&self, conversations_written: usize, total: usize) {
        self.bar_progress(conversations_written, total);
    }

    fn on_write_complete(&self, folders: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m Output complete: {} conversation folders in {:.2}s",
            folders, duration_secs
        );
    }
}
