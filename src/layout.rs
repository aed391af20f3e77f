//! The declared library layout.
//!
//! The layout is the *desired* category structure, written by the user in
//! `config.toml` as nested `[[layouts]]` tables:
//!
//! ```toml
//! [[layouts]]
//! name = "Math"
//! description = "Lecture notes"
//!
//!   [[layouts.content]]
//!   name = "Algebra"
//!
//!   [[layouts.content]]
//!   name = "Analysis"
//! ```
//!
//! Each node is identified across runs by `slugify(name)`. The source and
//! target roots both mirror this tree using slugified directory names:
//!
//! ```text
//! inbox/                 library/
//! └── math/              ├── metadata.json
//!     ├── algebra/       └── math/
//!     └── analysis/          ├── algebra/
//!                            └── analysis/
//! ```
//!
//! Declaration order is significant: directories are created and visited in
//! the order written, siblings are never sorted here.

use crate::naming::slugify;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// One declared category, possibly with nested categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LayoutNode {
    /// Display name. Its slug is the directory name and metadata key.
    pub name: String,
    /// Optional Markdown description shown on index pages.
    #[serde(default)]
    pub description: String,
    /// Nested categories, in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<LayoutNode>,
}

impl LayoutNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            content: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_children(mut self, children: Vec<LayoutNode>) -> Self {
        self.content = children;
        self
    }

    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

/// Every `/`-joined slug path of the layout, pre-order.
///
/// ```text
/// Math { Algebra, Analysis }, Physics  →  math, math/algebra, math/analysis, physics
/// ```
pub fn layout_paths(layouts: &[LayoutNode]) -> Vec<String> {
    let mut paths = Vec::new();
    collect_paths(layouts, "", &mut paths);
    paths
}

fn collect_paths(layouts: &[LayoutNode], base: &str, out: &mut Vec<String>) {
    for layout in layouts {
        let path = join_slug(base, &layout.slug());
        out.push(path.clone());
        collect_paths(&layout.content, &path, out);
    }
}

/// Paths of siblings whose names collapse onto the same slug.
///
/// `[Notes, notes!]` under `math` reports `math/notes`. Each collision is
/// reported once, in declaration order.
pub fn duplicate_slugs(layouts: &[LayoutNode]) -> Vec<String> {
    let mut duplicates = Vec::new();
    collect_duplicates(layouts, "", &mut duplicates);
    duplicates
}

fn collect_duplicates(layouts: &[LayoutNode], base: &str, out: &mut Vec<String>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for layout in layouts {
        let slug = layout.slug();
        let path = join_slug(base, &slug);
        if !seen.insert(slug.clone()) && reported.insert(slug) {
            out.push(path.clone());
        }
        collect_duplicates(&layout.content, &path, out);
    }
}

/// Layout nodes whose name slugifies to nothing (e.g. `"!!!"`).
pub fn empty_slugs(layouts: &[LayoutNode]) -> Vec<String> {
    let mut names = Vec::new();
    let mut stack: Vec<&LayoutNode> = layouts.iter().collect();
    while let Some(node) = stack.pop() {
        if node.slug().is_empty() {
            names.push(node.name.clone());
        }
        stack.extend(node.content.iter());
    }
    names
}

/// Create the slugified directory tree for `layouts` under `base`.
///
/// Existing directories are left alone; directories not in the layout are
/// never removed.
pub fn ensure_structure(layouts: &[LayoutNode], base: &Path) -> io::Result<()> {
    for layout in layouts {
        let dir = base.join(layout.slug());
        fs::create_dir_all(&dir)?;
        ensure_structure(&layout.content, &dir)?;
    }
    Ok(())
}

/// Append a slug to a `/`-joined relative path.
pub fn join_slug(base: &str, slug: &str) -> String {
    if base.is_empty() {
        slug.to_string()
    } else {
        format!("{base}/{slug}")
    }
}
