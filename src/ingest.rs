//! Ingest pipeline: turns waiting source documents into library entries.
//!
//! For every directory the [`LayoutWalk`] hands out, the matching source
//! directory is listed and each `*.pdf` is converted in filename order:
//!
//! 1. Parse `<title>_<yyMMdd>_<HHmmss>` from the name (mtime fallback).
//! 2. Slugify the title; artifacts go to `<target>/<path>/<slug>.pdf|.sdocx`.
//! 3. Repaginate (or copy) into the primary artifact.
//! 4. Extract the embedded note from the *original* source; without one, any
//!    earlier `<slug>.sdocx` is removed.
//! 5. Delete the source.
//! 6. Upsert the file record, replacing any previous record for the slug.
//!
//! A failure in any step stops that document only. Its source stays in place
//! for the next pass and no record is written. A title whose slug names a
//! subdirectory is such a failure. Directory listing and synchronization
//! failures stop the walk; the conversions done so far are returned with the
//! error so their records can still be saved.

use crate::extract::{ExtractError, NoteExtractor};
use crate::layout::{LayoutNode, layout_paths};
use crate::metadata::{DirectoryNode, FileNode, MetadataTree};
use crate::naming::{is_source_document, parse_source_filename, slugify};
use crate::repaginate::{
    PdfBackend, RepaginateError, RepaginateOptions, RepaginateSummary, copy_document, repaginate,
};
use crate::sync::{LayoutWalk, SyncError};
use crate::types::ArtifactKind;
use chrono::{DateTime, Local, NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

/// Pass-fatal ingest failure.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("cannot list {path}: {source}")]
    ListDirectory {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Failure converting one document. Contained by the pipeline.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Repaginate(#[from] RepaginateError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("title {0:?} has no usable characters for a file name")]
    EmptySlug(String),
    #[error("slug {0:?} already names a subdirectory")]
    SlugIsDirectory(String),
}

/// A pass-fatal error together with the work completed before it.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct IngestAborted {
    #[source]
    pub error: IngestError,
    pub outcome: IngestOutcome,
}

/// How documents are turned into artifacts.
pub struct Converter<'a, B: PdfBackend, E: NoteExtractor> {
    pub backend: &'a B,
    pub extractor: &'a E,
    /// `false` copies the source unchanged.
    pub repaginate: bool,
    pub options: RepaginateOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertedItem {
    pub source: PathBuf,
    /// Slug path of the directory.
    pub directory: String,
    pub slug: String,
    pub extensions: Vec<ArtifactKind>,
    /// Present when the document was repaginated.
    pub pages: Option<RepaginateSummary>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedItem {
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub converted: Vec<ConvertedItem>,
    pub failed: Vec<FailedItem>,
    /// Whether the Metadata Tree was modified (directories or files).
    pub changed: bool,
}

/// Current local time at second precision, as stored in metadata.
pub fn local_now() -> NaiveDateTime {
    truncate_seconds(Local::now().naive_local())
}

fn truncate_seconds(value: NaiveDateTime) -> NaiveDateTime {
    value.with_nanosecond(0).unwrap_or(value)
}

fn file_mtime(path: &Path) -> std::io::Result<NaiveDateTime> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(truncate_seconds(DateTime::<Local>::from(modified).naive_local()))
}

/// Source documents waiting in `dir`, sorted by file name.
pub fn pending_documents(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) if is_source_document(&name) => names.push(name),
            Ok(_) => {}
            Err(raw) => warn!(name = ?raw, "skipping non UTF-8 file name"),
        }
    }
    names.sort();
    Ok(names)
}

impl<B: PdfBackend, E: NoteExtractor> Converter<'_, B, E> {
    /// Produce the artifacts for one source document and consume it.
    ///
    /// `subdirectories` holds the slugs taken by directories next to the
    /// document; a title that slugifies onto one of them is rejected.
    pub fn convert(
        &self,
        source: &Path,
        file_name: &str,
        target_dir: &Path,
        subdirectories: &HashSet<String>,
        now: NaiveDateTime,
    ) -> Result<(FileNode, Option<RepaginateSummary>), ConvertError> {
        let record = parse_source_filename(file_name, file_mtime(source)?);
        if !record.from_filename {
            warn!(file = file_name, "no timestamp in file name, using modification time");
        }
        let slug = slugify(&record.title);
        if slug.is_empty() {
            return Err(ConvertError::EmptySlug(record.title));
        }
        if subdirectories.contains(&slug) {
            return Err(ConvertError::SlugIsDirectory(slug));
        }

        let pdf_target = target_dir.join(ArtifactKind::Pdf.file_name(&slug));
        let note_target = target_dir.join(ArtifactKind::Sdocx.file_name(&slug));

        let summary = if self.repaginate {
            Some(repaginate(self.backend, source, &pdf_target, &self.options)?)
        } else {
            copy_document(source, &pdf_target)?;
            None
        };
        let has_note = self.extractor.extract(source, &note_target)?;
        if !has_note {
            remove_stale(&note_target)?;
        }

        fs::remove_file(source)?;

        let mut extensions = vec![ArtifactKind::Pdf];
        if has_note {
            extensions.push(ArtifactKind::Sdocx);
        }
        let node = FileNode {
            slug,
            name: record.title,
            description: String::new(),
            modified: Some(record.modified),
            converted: Some(now),
            extensions,
        };
        Ok((node, summary))
    }
}

/// Delete an artifact left by an earlier version of the document.
fn remove_stale(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Run the pipeline over the whole layout.
pub fn ingest<B: PdfBackend, E: NoteExtractor>(
    layouts: &[LayoutNode],
    tree: &mut MetadataTree,
    source_root: &Path,
    target_root: &Path,
    converter: &Converter<'_, B, E>,
    now: NaiveDateTime,
) -> Result<IngestOutcome, IngestAborted> {
    let mut outcome = IngestOutcome::default();
    let declared: HashSet<String> = layout_paths(layouts).into_iter().collect();
    let mut walk = LayoutWalk::new(layouts, tree);
    let roots = (source_root, target_root);
    let result = drain(&mut walk, &declared, &mut outcome, roots, converter, now);
    outcome.changed = walk.changed() || !outcome.converted.is_empty();

    match result {
        Ok(()) => Ok(outcome),
        Err(error) => Err(IngestAborted { error, outcome }),
    }
}

/// Slugs of the directories inside `dir`, recorded or declared by the layout.
fn subdirectories(path: &str, dir: &DirectoryNode, declared: &HashSet<String>) -> HashSet<String> {
    let mut slugs: HashSet<String> = dir
        .content
        .iter()
        .filter(|(_, node)| node.as_directory().is_some())
        .map(|(slug, _)| slug.clone())
        .collect();
    let prefix = format!("{path}/");
    slugs.extend(
        declared
            .iter()
            .filter_map(|p| p.strip_prefix(&prefix))
            .filter(|rest| !rest.is_empty() && !rest.contains('/'))
            .map(str::to_string),
    );
    slugs
}

fn drain<B: PdfBackend, E: NoteExtractor>(
    walk: &mut LayoutWalk<'_, '_>,
    declared: &HashSet<String>,
    outcome: &mut IngestOutcome,
    (source_root, target_root): (&Path, &Path),
    converter: &Converter<'_, B, E>,
    now: NaiveDateTime,
) -> Result<(), IngestError> {
    while let Some(step) = walk.next_dir() {
        let (path, dir) = step?;
        let source_dir = source_root.join(&path);
        let target_dir = target_root.join(&path);
        let subdirs = subdirectories(&path, dir, declared);

        let pending =
            pending_documents(&source_dir).map_err(|source| IngestError::ListDirectory {
                path: source_dir.clone(),
                source,
            })?;

        for file_name in pending {
            let source = source_dir.join(&file_name);
            info!(source = %source.display(), "processing");

            match converter.convert(&source, &file_name, &target_dir, &subdirs, now) {
                Ok((node, pages)) => {
                    info!(
                        target = %target_dir.join(ArtifactKind::Pdf.file_name(&node.slug)).display(),
                        "processed"
                    );
                    outcome.converted.push(ConvertedItem {
                        source,
                        directory: path.clone(),
                        slug: node.slug.clone(),
                        extensions: node.extensions.clone(),
                        pages,
                    });
                    dir.upsert_file(node);
                }
                Err(e) => {
                    error!(source = %source.display(), error = %e, "failed to process document");
                    outcome.failed.push(FailedItem {
                        source,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::NoExtractor;
    use crate::layout::ensure_structure;
    use crate::repaginate::backend::tests::MockBackend;
    use crate::test_helpers::{at, math_layout, write_source};
    use tempfile::TempDir;

    /// Extractor that finds a note in every document whose name contains "note".
    struct NamedNoteExtractor;

    impl NoteExtractor for NamedNoteExtractor {
        fn extract(&self, source: &Path, destination: &Path) -> Result<bool, ExtractError> {
            let name = source.file_name().unwrap().to_string_lossy().to_lowercase();
            if name.contains("note") {
                fs::write(destination, b"sdocx")?;
                Ok(true)
            } else {
                Ok(false)
            }
        }
    }

    fn converter<'a, E: NoteExtractor>(
        backend: &'a MockBackend,
        extractor: &'a E,
    ) -> Converter<'a, MockBackend, E> {
        Converter {
            backend,
            extractor,
            repaginate: true,
            options: RepaginateOptions::default(),
        }
    }

    struct Roots {
        _tmp: TempDir,
        source: PathBuf,
        target: PathBuf,
    }

    fn roots() -> Roots {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("inbox");
        let target = tmp.path().join("library");
        ensure_structure(&math_layout(), &source).unwrap();
        ensure_structure(&math_layout(), &target).unwrap();
        Roots {
            _tmp: tmp,
            source,
            target,
        }
    }

    // =========================================================================
    // pending_documents
    // =========================================================================

    #[test]
    fn pending_lists_pdfs_sorted() {
        let tmp = TempDir::new().unwrap();
        for name in ["b.pdf", "A.PDF", "notes.txt", "c.pdf.part"] {
            fs::write(tmp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(tmp.path().join("sub.pdf")).unwrap();
        assert_eq!(pending_documents(tmp.path()).unwrap(), vec!["A.PDF", "b.pdf"]);
    }

    // =========================================================================
    // ingest
    // =========================================================================

    #[test]
    fn converts_document_and_records_it() {
        let r = roots();
        let src = write_source(&r.source, "math/algebra", "Algebra_240115_093000.pdf");
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        let now = at(2024, 2, 1, 8, 0, 0);

        let outcome = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            now,
        )
        .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.converted.len(), 1);
        assert!(outcome.failed.is_empty());
        assert!(!src.exists());
        assert!(r.target.join("math/algebra/algebra.pdf").exists());

        let dir = tree.directory(&["math", "algebra"]).unwrap();
        let file = dir.content["algebra"].as_file().unwrap();
        assert_eq!(file.name, "Algebra");
        assert_eq!(file.modified, Some(at(2024, 1, 15, 9, 30, 0)));
        assert_eq!(file.converted, Some(now));
        assert_eq!(file.extensions, vec![ArtifactKind::Pdf]);
    }

    #[test]
    fn note_extraction_adds_extension() {
        let r = roots();
        write_source(&r.source, "math", "Lecture note_240115_093000.pdf");
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();

        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NamedNoteExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        let file = tree.directory(&["math"]).unwrap().content["lecture-note"]
            .as_file()
            .unwrap()
            .clone();
        assert_eq!(file.extensions, vec![ArtifactKind::Pdf, ArtifactKind::Sdocx]);
        assert!(r.target.join("math/lecture-note.sdocx").exists());
    }

    #[test]
    fn reprocessing_without_note_drops_old_note() {
        let r = roots();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        let note = r.target.join("math/lecture-note.sdocx");

        write_source(&r.source, "math", "Lecture note_240115_093000.pdf");
        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NamedNoteExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();
        assert!(note.exists());

        write_source(&r.source, "math", "Lecture note_240120_120000.pdf");
        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 2, 8, 0, 0),
        )
        .unwrap();

        assert!(!note.exists());
        assert!(r.target.join("math/lecture-note.pdf").exists());
        let file = tree.directory(&["math"]).unwrap().content["lecture-note"]
            .as_file()
            .unwrap()
            .clone();
        assert_eq!(file.extensions, vec![ArtifactKind::Pdf]);
    }

    #[test]
    fn failure_is_isolated_and_keeps_source() {
        let r = roots();
        let bad = write_source(&r.source, "math/algebra", "Broken_240115_093000.pdf");
        let good = write_source(&r.source, "math/algebra", "Groups_240116_100000.pdf");
        let backend = MockBackend::new().failing_on("Broken_240115_093000.pdf");
        let mut tree = MetadataTree::new();

        let outcome = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].source, bad);
        assert_eq!(outcome.converted.len(), 1);
        assert!(bad.exists());
        assert!(!good.exists());
        assert!(!r.target.join("math/algebra/broken.pdf").exists());

        let dir = tree.directory(&["math", "algebra"]).unwrap();
        assert!(!dir.content.contains_key("broken"));
        assert!(dir.content.contains_key("groups"));
    }

    #[test]
    fn title_colliding_with_subdirectory_is_rejected() {
        let r = roots();
        let clash = write_source(&r.source, "math", "Algebra_240116_093000.pdf");
        write_source(&r.source, "math/algebra", "Groups_240115_093000.pdf");
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();

        let outcome = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].source, clash);
        assert!(clash.exists());
        assert!(!r.target.join("math/algebra.pdf").exists());
        let algebra = tree.directory(&["math", "algebra"]).unwrap();
        assert!(algebra.content.contains_key("groups"));
    }

    #[test]
    fn orphaned_subdirectory_blocks_matching_title() {
        let r = roots();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        crate::sync::synchronize(&math_layout(), &mut tree).unwrap();
        let clash = write_source(&r.source, "math", "Analysis (2).pdf");

        // math/analysis is still recorded but no longer declared
        let outcome = ingest(
            &[LayoutNode::new("Math")],
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        assert!(outcome.converted.is_empty());
        assert!(outcome.failed[0].error.contains("subdirectory"));
        assert!(clash.exists());
        assert!(tree.directory(&["math", "analysis"]).is_some());
    }

    #[test]
    fn aborted_walk_returns_earlier_conversions() {
        let r = roots();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        crate::sync::synchronize(&[LayoutNode::new("Math")], &mut tree).unwrap();
        tree.directory_mut(&["math"])
            .unwrap()
            .upsert_file(crate::test_helpers::file_record("analysis"));
        let src = write_source(&r.source, "math/algebra", "Groups_240115_093000.pdf");

        let aborted = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap_err();

        assert!(matches!(
            aborted.error,
            IngestError::Sync(SyncError::NotADirectory { .. })
        ));
        assert!(aborted.outcome.changed);
        assert_eq!(aborted.outcome.converted.len(), 1);
        assert!(!src.exists());
        let algebra = tree.directory(&["math", "algebra"]).unwrap();
        assert!(algebra.content.contains_key("groups"));
    }

    #[test]
    fn copy_mode_keeps_bytes() {
        let r = roots();
        write_source(&r.source, "math", "Raw_240115_093000.pdf");
        let backend = MockBackend::new();
        let mut conv = converter(&backend, &NoExtractor);
        conv.repaginate = false;
        let mut tree = MetadataTree::new();

        let outcome = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &conv,
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        assert!(outcome.converted[0].pages.is_none());
        assert!(backend.get_operations().is_empty());
        assert_eq!(
            fs::read(r.target.join("math/raw.pdf")).unwrap(),
            crate::test_helpers::SOURCE_BYTES
        );
    }

    #[test]
    fn reprocessing_same_slug_replaces_record() {
        let r = roots();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();

        write_source(&r.source, "math", "Sets_240115_093000.pdf");
        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        write_source(&r.source, "math", "Sets_240120_120000 (1).pdf");
        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 2, 8, 0, 0),
        )
        .unwrap();

        let dir = tree.directory(&["math"]).unwrap();
        assert_eq!(dir.files().count(), 1);
        let file = dir.content["sets"].as_file().unwrap();
        assert_eq!(file.modified, Some(at(2024, 1, 20, 12, 0, 0)));
        assert_eq!(file.converted, Some(at(2024, 2, 2, 8, 0, 0)));
    }

    #[test]
    fn nothing_pending_on_synced_tree_is_unchanged() {
        let r = roots();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        crate::sync::synchronize(&math_layout(), &mut tree).unwrap();

        let outcome = ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();
        assert!(!outcome.changed);
    }

    #[test]
    fn missing_source_directory_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();
        let err = ingest(
            &math_layout(),
            &mut tree,
            &tmp.path().join("nowhere"),
            tmp.path(),
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap_err();
        assert!(matches!(err.error, IngestError::ListDirectory { .. }));
        assert!(err.outcome.converted.is_empty());
    }

    #[test]
    fn untimestamped_name_uses_mtime() {
        let r = roots();
        let src = write_source(&r.source, "math", "Scratch.pdf");
        let expected = file_mtime(&src).unwrap();
        let backend = MockBackend::new();
        let mut tree = MetadataTree::new();

        ingest(
            &math_layout(),
            &mut tree,
            &r.source,
            &r.target,
            &converter(&backend, &NoExtractor),
            at(2024, 2, 1, 8, 0, 0),
        )
        .unwrap();

        let file = tree.directory(&["math"]).unwrap().content["scratch"]
            .as_file()
            .unwrap()
            .clone();
        assert_eq!(file.name, "Scratch");
        assert_eq!(file.modified, Some(expected));
    }
}
