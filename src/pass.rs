//! One serialized read-modify-write cycle over the library.
//!
//! Every entry point (CLI `process`, initial watch run, watch events) ends up
//! in [`run_pass`]:
//!
//! ```text
//! pre-hook
//!   → ensure source/target structure
//!   → load metadata.json
//!   → Source | Full : ingest (synchronizes while walking)
//!     Target        : synchronize
//!   → Target | Full : reconcile deleted artifacts
//!   → Full + prune  : drop orphaned directory records
//!   → save metadata.json        (only if something changed)
//!   → render index              (if changed, always on Full)
//! post-hook                     (also after a failed pass)
//! ```
//!
//! Passes never overlap: a process-wide lock is held for the whole cycle,
//! hooks included.

use crate::config::{Config, OrphanPolicy};
use crate::extract::NoteExtractor;
use crate::hooks::run_hook;
use crate::ingest::{ConvertedItem, Converter, FailedItem, IngestError, ingest, local_now};
use crate::layout::ensure_structure;
use crate::metadata::{MetadataError, MetadataTree};
use crate::reconcile::{RemovedRecord, reconcile};
use crate::render::{RenderError, RenderSummary, render_index};
use crate::repaginate::PdfBackend;
use crate::sync::{SyncError, prune_orphans, synchronize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum PassError {
    #[error("cannot create library structure: {0}")]
    Structure(#[from] std::io::Error),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("failed to render index: {0}")]
    Render(#[from] RenderError),
}

/// What triggered a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// A new document arrived in the source tree.
    Source,
    /// An artifact disappeared from the target tree.
    Target,
    /// Startup, `process`, or a config change.
    Full,
}

impl PassKind {
    fn ingests(self) -> bool {
        matches!(self, PassKind::Source | PassKind::Full)
    }

    fn reconciles(self) -> bool {
        matches!(self, PassKind::Target | PassKind::Full)
    }
}

impl std::fmt::Display for PassKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PassKind::Source => "source",
            PassKind::Target => "target",
            PassKind::Full => "full",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct PassReport {
    pub kind: PassKind,
    pub converted: Vec<ConvertedItem>,
    pub failed: Vec<FailedItem>,
    pub removed: Vec<RemovedRecord>,
    /// Slug paths of directory records dropped under the prune policy.
    pub pruned: Vec<String>,
    /// Whether metadata.json was rewritten.
    pub saved: bool,
    pub rendered: Option<RenderSummary>,
}

impl PassReport {
    fn new(kind: PassKind) -> Self {
        Self {
            kind,
            converted: Vec::new(),
            failed: Vec::new(),
            removed: Vec::new(),
            pruned: Vec::new(),
            saved: false,
            rendered: None,
        }
    }
}

static PASS_LOCK: Mutex<()> = Mutex::new(());

fn acquire_pass_lock() -> MutexGuard<'static, ()> {
    // The guarded state lives on disk and is replaced atomically.
    PASS_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run one pass of `kind` over the library described by `config`.
pub fn run_pass<B: PdfBackend, E: NoteExtractor>(
    config: &Config,
    backend: &B,
    extractor: &E,
    kind: PassKind,
) -> Result<PassReport, PassError> {
    let _guard = acquire_pass_lock();
    info!(%kind, "starting pass");

    run_hook("pre", &config.hooks.pre);
    let result = run_stages(config, backend, extractor, kind);
    run_hook("post", &config.hooks.post);

    if let Ok(report) = &result {
        info!(
            %kind,
            converted = report.converted.len(),
            failed = report.failed.len(),
            removed = report.removed.len(),
            saved = report.saved,
            "pass finished"
        );
    }
    result
}

fn ensure_roots(config: &Config) -> std::io::Result<()> {
    for root in [config.source_root(), config.target_root()] {
        fs::create_dir_all(root)?;
        ensure_structure(&config.layouts, root)?;
    }
    Ok(())
}

fn run_stages<B: PdfBackend, E: NoteExtractor>(
    config: &Config,
    backend: &B,
    extractor: &E,
    kind: PassKind,
) -> Result<PassReport, PassError> {
    let mut report = PassReport::new(kind);
    ensure_roots(config)?;

    let target_root = config.target_root();
    let mut tree = MetadataTree::load(target_root)?;
    let mut changed = false;

    if kind.ingests() {
        let converter = Converter {
            backend,
            extractor,
            repaginate: config.conversion.repaginate,
            options: config.conversion.repaginate_options(),
        };
        let outcome = match ingest(
            &config.layouts,
            &mut tree,
            config.source_root(),
            target_root,
            &converter,
            local_now(),
        ) {
            Ok(outcome) => outcome,
            Err(aborted) => {
                // Consumed sources must not lose their records.
                if aborted.outcome.changed {
                    info!(
                        converted = aborted.outcome.converted.len(),
                        "saving metadata before aborting"
                    );
                    tree.save(target_root)?;
                }
                return Err(aborted.error.into());
            }
        };
        changed |= outcome.changed;
        report.converted = outcome.converted;
        report.failed = outcome.failed;
    } else {
        changed |= synchronize(&config.layouts, &mut tree)?;
    }

    if kind.reconciles() {
        report.removed = reconcile(&mut tree, target_root);
        changed |= !report.removed.is_empty();
    }

    if kind == PassKind::Full && config.policy.orphaned_directories == OrphanPolicy::Prune {
        report.pruned = prune_orphans(&config.layouts, &mut tree);
        changed |= !report.pruned.is_empty();
    }

    if changed {
        info!("saving metadata");
        tree.save(target_root)?;
        report.saved = true;
    }

    if changed || kind == PassKind::Full {
        report.rendered = Some(render_index(&config.site, &tree, target_root)?);
    }

    Ok(report)
}

/// Re-render the index from the persisted tree without touching anything else.
pub fn render_only(config: &Config) -> Result<RenderSummary, PassError> {
    let _guard = acquire_pass_lock();
    let target_root: &Path = config.target_root();
    fs::create_dir_all(target_root)?;
    let tree = MetadataTree::load(target_root)?;
    Ok(render_index(&config.site, &tree, target_root)?)
}
