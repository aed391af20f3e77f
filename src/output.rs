//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Every entity (directory, document) is shown by its human name and a
//! positional index; slugs, artifact files and timestamps follow as indented
//! context lines. Paths are always library-relative.
//!
//! # Output Format
//!
//! ## Tree (`scribeshelf tree`)
//!
//! ```text
//! 001 Math (1 document)
//!     Description: Lecture notes
//!     001 Algebra (1 document)
//!         001 Groups
//!             Files: groups.pdf, groups.sdocx
//!             Modified: 15. 01. 2024, 09:30:00
//!     002 Sets
//!         Files: sets.pdf
//!         Modified: 16. 01. 2024, 10:00:00
//! 002 Physics (empty)
//! ```
//!
//! ## Layout (`scribeshelf check`)
//!
//! ```text
//! 001 Math → math/
//!     Description: Lecture notes
//!     001 Algebra → math/algebra/
//! 002 Physics → physics/
//! ```
//!
//! ## Pass report (`scribeshelf process`)
//!
//! ```text
//! Full pass
//! Converted
//! 001 Algebra_240115_093000.pdf → math/algebra/algebra.pdf
//!     Pages: 3 → 5
//! Failed
//! 001 Broken.pdf
//!     Error: failed to render ...
//! Removed
//! 001 math/algebra/groups.pdf
//!
//! 1 converted, 1 failed, 1 removed; metadata saved, 4 pages rendered
//! ```
//!
//! # Architecture
//!
//! Each report has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::layout::{LayoutNode, join_slug};
use crate::metadata::{Content, DirectoryNode, FileNode, MetadataNode, MetadataTree, display_order};
use crate::pass::PassReport;
use crate::types::{ArtifactKind, display_timestamp};

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Truncate text to `max` characters, appending `...` if truncated.
fn truncate_desc(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// First line of a description, shortened for one-line display.
fn description_line(text: &str) -> Option<String> {
    let first = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    Some(truncate_desc(first, 60))
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Directory header with the number of documents directly inside it.
///
/// ```text
/// 001 Math (2 documents)
/// 002 Physics (empty)
/// ```
fn directory_header(index: usize, dir: &DirectoryNode) -> String {
    let count = dir.files().count();
    let detail = if dir.content.is_empty() {
        "empty".to_string()
    } else {
        plural(count, "document")
    };
    format!("{} {} ({})", format_index(index), dir.name, detail)
}

// ============================================================================
// Tree
// ============================================================================

fn file_lines(index: usize, file: &FileNode, depth: usize, lines: &mut Vec<String>) {
    lines.push(format!("{}{} {}", indent(depth), format_index(index), file.name));
    let files: Vec<String> = file
        .extensions
        .iter()
        .map(|kind: &ArtifactKind| kind.file_name(&file.slug))
        .collect();
    lines.push(format!("{}Files: {}", indent(depth + 1), files.join(", ")));
    if file.modified.is_some() {
        lines.push(format!(
            "{}Modified: {}",
            indent(depth + 1),
            display_timestamp(file.modified.as_ref())
        ));
    }
}

fn content_lines(content: &Content, depth: usize, lines: &mut Vec<String>) {
    for (pos, node) in content.values().enumerate() {
        match node {
            MetadataNode::Directory(dir) => {
                lines.push(format!("{}{}", indent(depth), directory_header(pos + 1, dir)));
                if let Some(desc) = description_line(&dir.description) {
                    lines.push(format!("{}Description: {}", indent(depth + 1), desc));
                }
                content_lines(&dir.content, depth + 1, lines);
            }
            MetadataNode::File(file) => file_lines(pos + 1, file, depth, lines),
        }
    }
}

/// The library in display order: directories first, then documents by name.
pub fn format_tree(tree: &MetadataTree) -> Vec<String> {
    if tree.content.is_empty() {
        return vec!["Library is empty".to_string()];
    }
    let mut lines = Vec::new();
    content_lines(&display_order(&tree.content), 0, &mut lines);
    lines
}

pub fn print_tree(tree: &MetadataTree) {
    for line in format_tree(tree) {
        println!("{}", line);
    }
}

// ============================================================================
// Layout
// ============================================================================

fn layout_lines(layouts: &[LayoutNode], parent: &str, depth: usize, lines: &mut Vec<String>) {
    for (pos, layout) in layouts.iter().enumerate() {
        let path = join_slug(parent, &layout.slug());
        lines.push(format!(
            "{}{} {} → {}/",
            indent(depth),
            format_index(pos + 1),
            layout.name,
            path
        ));
        if let Some(desc) = description_line(&layout.description) {
            lines.push(format!("{}Description: {}", indent(depth + 1), desc));
        }
        layout_lines(&layout.content, &path, depth + 1, lines);
    }
}

/// Configured layout in declaration order with the directory each maps to.
pub fn format_layout(layouts: &[LayoutNode]) -> Vec<String> {
    if layouts.is_empty() {
        return vec!["No layouts configured".to_string()];
    }
    let mut lines = Vec::new();
    layout_lines(layouts, "", 0, &mut lines);
    lines
}

pub fn print_layout(layouts: &[LayoutNode]) {
    for line in format_layout(layouts) {
        println!("{}", line);
    }
}

// ============================================================================
// Pass report
// ============================================================================

fn file_name_of(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn format_pass_report(report: &PassReport) -> Vec<String> {
    let mut lines = vec![format!("{} pass", capitalize(&report.kind.to_string()))];

    if !report.converted.is_empty() {
        lines.push("Converted".to_string());
        for (pos, item) in report.converted.iter().enumerate() {
            let artifact = join_slug(&item.directory, &ArtifactKind::Pdf.file_name(&item.slug));
            lines.push(format!(
                "{} {} → {}",
                format_index(pos + 1),
                file_name_of(&item.source),
                artifact
            ));
            if let Some(pages) = &item.pages {
                lines.push(format!(
                    "{}Pages: {} → {}",
                    indent(1),
                    pages.source_pages,
                    pages.output_pages
                ));
            }
            if item.extensions.contains(&ArtifactKind::Sdocx) {
                lines.push(format!(
                    "{}Note: {}",
                    indent(1),
                    join_slug(&item.directory, &ArtifactKind::Sdocx.file_name(&item.slug))
                ));
            }
        }
    }

    if !report.failed.is_empty() {
        lines.push("Failed".to_string());
        for (pos, item) in report.failed.iter().enumerate() {
            lines.push(format!("{} {}", format_index(pos + 1), file_name_of(&item.source)));
            lines.push(format!("{}Error: {}", indent(1), item.error));
        }
    }

    if !report.removed.is_empty() {
        lines.push("Removed".to_string());
        for (pos, record) in report.removed.iter().enumerate() {
            let artifact = join_slug(&record.directory, &ArtifactKind::Pdf.file_name(&record.slug));
            lines.push(format!("{} {}", format_index(pos + 1), artifact));
        }
    }

    if !report.pruned.is_empty() {
        lines.push("Pruned".to_string());
        for (pos, path) in report.pruned.iter().enumerate() {
            lines.push(format!("{} {}/", format_index(pos + 1), path));
        }
    }

    let mut summary = format!(
        "{} converted, {} failed, {} removed; ",
        report.converted.len(),
        report.failed.len(),
        report.removed.len()
    );
    summary.push_str(if report.saved {
        "metadata saved"
    } else {
        "metadata unchanged"
    });
    if let Some(rendered) = &report.rendered {
        summary.push_str(&format!(", {} rendered", plural(rendered.written.len(), "page")));
    }
    lines.push(String::new());
    lines.push(summary);
    lines
}

pub fn print_pass_report(report: &PassReport) {
    for line in format_pass_report(report) {
        println!("{}", line);
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
