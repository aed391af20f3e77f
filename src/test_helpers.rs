//! Shared test utilities for the scribeshelf test suite.
//!
//! Provides fixture builders for libraries on disk (config, layout, source
//! documents) and lookup helpers for the Metadata Tree.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let lib = TestLibrary::new(math_layout());
//! write_source(lib.source(), "math/algebra", "Algebra_240115_093000.pdf");
//!
//! let report = run_pass(&lib.config, &MockBackend::new(), &NoExtractor, PassKind::Full).unwrap();
//! let file = find_file(&lib.load_tree(), "math/algebra", "algebra");
//! assert_eq!(file.name, "Algebra");
//! ```

use chrono::{NaiveDate, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Config;
use crate::layout::LayoutNode;
use crate::metadata::{FileNode, MetadataTree};
use crate::types::ArtifactKind;

/// Bytes of every fake source document.
pub const SOURCE_BYTES: &[u8] = b"%PDF-1.4 source\n";

// =========================================================================
// Fixture setup
// =========================================================================

pub fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, s)
        .unwrap()
}

/// `Math { Algebra, Analysis }`, `Physics`.
pub fn math_layout() -> Vec<LayoutNode> {
    vec![
        LayoutNode::new("Math")
            .with_description("Lecture notes")
            .with_children(vec![LayoutNode::new("Algebra"), LayoutNode::new("Analysis")]),
        LayoutNode::new("Physics"),
    ]
}

/// Drop a fake device document into `root/<dir>/` and return its path.
pub fn write_source(root: &Path, dir: &str, file_name: &str) -> PathBuf {
    let dir = root.join(dir);
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    fs::write(&path, SOURCE_BYTES).unwrap();
    path
}

/// A converted-file record with fixed timestamps and a primary artifact.
pub fn file_record(slug: &str) -> FileNode {
    FileNode {
        slug: slug.to_string(),
        name: slug.to_string(),
        description: String::new(),
        modified: Some(at(2024, 1, 15, 9, 30, 0)),
        converted: Some(at(2024, 1, 15, 10, 0, 0)),
        extensions: vec![ArtifactKind::Pdf],
    }
}

/// A temporary library: `inbox/` and `library/` under one temp dir, with a
/// config pointing at them.
pub struct TestLibrary {
    pub tmp: TempDir,
    pub config: Config,
}

impl TestLibrary {
    pub fn new(layouts: Vec<LayoutNode>) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.directories.source = tmp.path().join("inbox");
        config.directories.target = tmp.path().join("library");
        config.layouts = layouts;
        Self { tmp, config }
    }

    pub fn source(&self) -> &Path {
        &self.config.directories.source
    }

    pub fn target(&self) -> &Path {
        &self.config.directories.target
    }

    pub fn load_tree(&self) -> MetadataTree {
        MetadataTree::load(self.target()).unwrap()
    }

    pub fn metadata_bytes(&self) -> Vec<u8> {
        fs::read(MetadataTree::path_in(self.target())).unwrap()
    }
}

// =========================================================================
// Lookup helpers
// =========================================================================

/// Find a file record by directory slug path and slug. Panics if missing.
pub fn find_file<'a>(tree: &'a MetadataTree, dir: &str, slug: &str) -> &'a FileNode {
    let path: Vec<&str> = dir.split('/').collect();
    tree.directory(&path)
        .unwrap_or_else(|| panic!("directory '{dir}' not found"))
        .content
        .get(slug)
        .and_then(|n| n.as_file())
        .unwrap_or_else(|| panic!("file '{slug}' not found in '{dir}'"))
}

/// Slugs of the file records directly in `dir`, in stored order.
pub fn file_slugs(tree: &MetadataTree, dir: &str) -> Vec<String> {
    let path: Vec<&str> = dir.split('/').collect();
    tree.directory(&path)
        .unwrap_or_else(|| panic!("directory '{dir}' not found"))
        .files()
        .map(|f| f.slug.clone())
        .collect()
}
