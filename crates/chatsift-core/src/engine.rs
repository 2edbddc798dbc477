use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::archive;
use crate::assets;
use crate::config::AppConfig;
use crate::conversation::model::LoadedConversation;
use crate::conversation::loader;
use crate::error::Error;
use crate::media::MediaIndex;
use crate::output::{self, WriteItem};
use crate::progress::ProgressReporter;
use crate::references::{self, Citation};
use crate::resolver::{ConversationResolution, Resolver, ResolverStats};

/// Name of the extraction workdir inside the output directory.
pub const WORKDIR_NAME: &str = "_tmp";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Legacy flat layout instead of per-conversation folders.
    pub flat: bool,
    /// Retain the extraction workdir on success (enables `rematch-media`).
    pub keep_workdir: bool,
}

#[derive(Debug)]
pub struct PipelineResult {
    pub extract_duration: Duration,
    pub index_duration: Duration,
    pub load_duration: Duration,
    pub resolve_duration: Duration,
    pub write_duration: Duration,
    pub archives_extracted: usize,
    pub archives_skipped: usize,
    pub media_indexed: usize,
    pub index_collisions: u64,
    pub conversations_emitted: usize,
    pub duplicates_dropped: usize,
    pub media_copied: usize,
    pub with_media: usize,
    pub with_assets: usize,
    pub stats: ResolverStats,
}

pub struct ExportEngine {
    config: AppConfig,
    cancel: Arc<AtomicBool>,
}

impl ExportEngine {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Token a host can flip to abort the pipeline. Partial output is left
    /// in place for recovery; the workdir is retained.
    pub fn cancel_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    fn check_cancelled(&self) -> Result<(), Error> {
        if self.cancel.load(Ordering::Relaxed) {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run the full pipeline:
    /// 1. Recursive archive extraction into `<out>/_tmp`
    /// 2. Media indexing (archive tree + recovery roots)
    /// 3. Conversation discovery and normalization
    /// 4. Citation extraction + seven-strategy media resolution
    /// 5. Asset extraction
    /// 6. Output tree generation
    pub fn run(
        &self,
        archive_path: &Path,
        out_dir: &Path,
        options: &RunOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<PipelineResult, Error> {
        self.cancel.store(false, Ordering::Relaxed);
        output::check_output_slot(out_dir)?;

        let workdir = out_dir.join(WORKDIR_NAME);
        fs::create_dir_all(&workdir)?;

        // Phase 1: Extract
        info!("Extracting {} ...", archive_path.display());
        reporter.on_extract_start();
        let extract_start = Instant::now();
        let report = archive::extract_recursive(
            archive_path,
            &workdir,
            Duration::from_secs(self.config.external_unzip_timeout_secs),
            &self.cancel,
            |done, current| reporter.on_extract_progress(done, current),
        )?;
        let extract_duration = extract_start.elapsed();
        reporter.on_extract_complete(report.archives_extracted, extract_duration.as_secs_f64());
        debug!(
            "Extraction completed in {:.2}s — {} archives, {} skipped",
            extract_duration.as_secs_f64(),
            report.archives_extracted,
            report.archives_skipped,
        );

        let recovery_roots = self.recovery_roots(archive_path.parent());
        let mut result = self.process_workdir(
            &workdir,
            &recovery_roots,
            out_dir,
            options.flat,
            reporter,
        )?;
        result.extract_duration = extract_duration;
        result.archives_extracted = report.archives_extracted;
        result.archives_skipped = report.archives_skipped;

        if options.keep_workdir {
            info!("Workdir retained at {}", workdir.display());
        } else if let Err(err) = fs::remove_dir_all(&workdir) {
            warn!("Could not remove workdir {}: {}", workdir.display(), err);
        }

        Ok(result)
    }

    /// Re-run resolution over an existing extraction without re-unpacking.
    /// Requires a retained `<out>/_tmp` workdir.
    pub fn rematch(
        &self,
        out_dir: &Path,
        options: &RunOptions,
        reporter: &dyn ProgressReporter,
    ) -> Result<PipelineResult, Error> {
        self.cancel.store(false, Ordering::Relaxed);

        let workdir = out_dir.join(WORKDIR_NAME);
        if !workdir.is_dir() {
            return Err(Error::InvalidInput(format!(
                "no retained extraction at {}; re-run the full parse with --keep-workdir",
                workdir.display()
            )));
        }

        output::clean_previous_output(out_dir)?;
        let recovery_roots = self.recovery_roots(out_dir.parent());
        self.process_workdir(&workdir, &recovery_roots, out_dir, options.flat, reporter)
    }

    /// Additional media roots: an explicitly configured directory, or a
    /// `recovered_files` directory alongside the input.
    fn recovery_roots(&self, beside: Option<&Path>) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        if let Some(dir) = &self.config.recovery_dir {
            let path = PathBuf::from(dir);
            if path.is_dir() {
                roots.push(path);
            } else {
                warn!("Configured recovery_dir does not exist: {}", dir);
            }
        }
        if let Some(parent) = beside {
            let sibling = parent.join("recovered_files");
            if sibling.is_dir() && !roots.contains(&sibling) {
                roots.push(sibling);
            }
        }
        roots
    }

    /// Phases 2-6, shared between `run` and `rematch`.
    fn process_workdir(
        &self,
        workdir: &Path,
        recovery_roots: &[PathBuf],
        out_dir: &Path,
        flat: bool,
        reporter: &dyn ProgressReporter,
    ) -> Result<PipelineResult, Error> {
        self.check_cancelled()?;

        // Phase 2: Index media
        info!("Indexing media files...");
        reporter.on_index_start();
        let index_start = Instant::now();
        let recovery_refs: Vec<&Path> = recovery_roots.iter().map(PathBuf::as_path).collect();
        let index = MediaIndex::build(workdir, &recovery_refs, &self.config.ignore_patterns)?;
        let index_duration = index_start.elapsed();
        reporter.on_index_complete(index.len(), index_duration.as_secs_f64());
        debug!(
            "Index completed in {:.2}s — {} media files, {} collisions",
            index_duration.as_secs_f64(),
            index.len(),
            index.collisions,
        );

        self.check_cancelled()?;

        // Phase 3: Load conversations
        info!("Loading conversations...");
        reporter.on_load_start();
        let load_start = Instant::now();
        let (conversations, load_stats) = loader::load_conversations(workdir);
        let load_duration = load_start.elapsed();
        reporter.on_load_complete(
            conversations.len(),
            load_stats.duplicates_dropped + load_stats.empty_dropped,
            load_duration.as_secs_f64(),
        );
        debug!(
            "Load completed in {:.2}s — {} conversations ({} duplicates, {} empty dropped)",
            load_duration.as_secs_f64(),
            conversations.len(),
            load_stats.duplicates_dropped,
            load_stats.empty_dropped,
        );

        self.check_cancelled()?;

        // Phase 4: Resolve media. The index is frozen; conversations are
        // embarrassingly parallel from here on.
        info!("Resolving media citations...");
        reporter.on_resolve_start();
        let resolve_start = Instant::now();
        let (items, stats) = self.resolve_all(&index, conversations, reporter)?;
        let resolve_duration = resolve_start.elapsed();
        let resolved_total: u64 = stats.resolved_by_strategy.values().sum();
        reporter.on_resolve_complete(
            resolved_total as usize,
            stats.unresolved_citations as usize,
            resolve_duration.as_secs_f64(),
        );

        self.check_cancelled()?;

        // Phase 5: Write output
        info!("Writing output...");
        reporter.on_write_start();
        let write_start = Instant::now();
        let write_report = output::write_output(
            &items,
            &index,
            &stats,
            out_dir,
            flat,
            &self.cancel,
            |done, total| reporter.on_write_progress(done, total),
        )?;
        let write_duration = write_start.elapsed();
        reporter.on_write_complete(write_report.folders_created, write_duration.as_secs_f64());

        Ok(PipelineResult {
            extract_duration: Duration::ZERO,
            index_duration,
            load_duration,
            resolve_duration,
            write_duration,
            archives_extracted: 0,
            archives_skipped: 0,
            media_indexed: index.len(),
            index_collisions: index.collisions,
            conversations_emitted: items.len(),
            duplicates_dropped: load_stats.duplicates_dropped,
            media_copied: write_report.media_copied,
            with_media: write_report.with_media,
            with_assets: write_report.with_assets,
            stats,
        })
    }

    fn resolve_all(
        &self,
        index: &MediaIndex,
        conversations: Vec<LoadedConversation>,
        reporter: &dyn ProgressReporter,
    ) -> Result<(Vec<WriteItem>, ResolverStats), Error> {
        let citation_sets: Vec<Vec<Citation>> = conversations
            .par_iter()
            .map(|conv| {
                if self.cancel.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                Ok(references::extract_citations(conv))
            })
            .collect::<Result<_, Error>>()?;

        let resolver = Resolver::new(index, &citation_sets);

        let done = AtomicUsize::new(0);
        let total = conversations.len();
        let resolutions: Vec<ConversationResolution> = conversations
            .par_iter()
            .zip(citation_sets.par_iter())
            .map(|(conv, citations)| {
                if self.cancel.load(Ordering::Relaxed) {
                    return Err(Error::Cancelled);
                }
                let resolution = resolver.resolve_conversation(&conv.id, citations);
                reporter.on_resolve_progress(done.fetch_add(1, Ordering::Relaxed) + 1, total);
                Ok(resolution)
            })
            .collect::<Result<_, Error>>()?;

        // Stats merge in worklist order keeps example selection stable.
        let mut stats = ResolverStats::default();
        for resolution in &resolutions {
            stats.merge(resolution.stats.clone());
        }

        let items: Vec<WriteItem> = conversations
            .into_iter()
            .zip(resolutions)
            .map(|(conversation, resolution)| {
                let assets = assets::extract_assets(&conversation.raw);
                WriteItem {
                    conversation,
                    resolution,
                    assets,
                }
            })
            .collect();

        Ok((items, stats))
    }
}

impl std::fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} conversations, {} media files indexed, {} copied, {} unresolved citations",
            self.conversations_emitted,
            self.media_indexed,
            self.media_copied,
            self.stats.unresolved_citations,
        )
    }
}
