//! The persisted Metadata Tree (`metadata.json`).
//!
//! The tree is the single source of truth for what the library contains and
//! which documents have already been converted. It mirrors the layout, adding
//! one [`FileNode`] per converted document:
//!
//! ```json
//! {
//!   "math": {
//!     "type": "directory",
//!     "slug": "math",
//!     "name": "Math",
//!     "description": "",
//!     "content": {
//!       "algebra": {
//!         "type": "file",
//!         "slug": "algebra",
//!         "name": "Algebra",
//!         "description": "",
//!         "modified": "2024-01-15 09:30:00",
//!         "converted": "2024-01-15 10:02:11",
//!         "extensions": ["pdf", "sdocx"]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! ## Invariants
//!
//! - Every key of a content mapping equals the `slug` of its value.
//! - Content mappings keep insertion order. Sorting for display happens on a
//!   copy ([`display_order`]), never on the persisted tree.
//!
//! ## Persistence
//!
//! [`MetadataTree::load`] reads the file at the start of a pass (an absent file
//! is an empty library); [`MetadataTree::save`] rewrites it wholesale via a
//! temporary sibling and a rename. Callers only save when the pass changed
//! something, so an idempotent pass never touches the file.

use crate::types::{ArtifactKind, timestamp};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name of the persisted tree inside the target root.
pub const METADATA_FILE: &str = "metadata.json";

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid metadata in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Slug → node mapping, insertion ordered.
pub type Content = IndexMap<String, MetadataNode>;

/// A node of the tree: a category directory or a converted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataNode {
    Directory(DirectoryNode),
    File(FileNode),
}

impl MetadataNode {
    pub fn slug(&self) -> &str {
        match self {
            MetadataNode::Directory(d) => &d.slug,
            MetadataNode::File(f) => &f.slug,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            MetadataNode::Directory(d) => &d.name,
            MetadataNode::File(f) => &f.name,
        }
    }

    pub fn as_directory(&self) -> Option<&DirectoryNode> {
        match self {
            MetadataNode::Directory(d) => Some(d),
            MetadataNode::File(_) => None,
        }
    }

    pub fn as_directory_mut(&mut self) -> Option<&mut DirectoryNode> {
        match self {
            MetadataNode::Directory(d) => Some(d),
            MetadataNode::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileNode> {
        match self {
            MetadataNode::Directory(_) => None,
            MetadataNode::File(f) => Some(f),
        }
    }
}

/// A category mirrored from the layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryNode {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: Content,
}

impl DirectoryNode {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            name: name.into(),
            description: String::new(),
            content: Content::new(),
        }
    }

    /// Iterate over the file records directly inside this directory.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.content.values().filter_map(MetadataNode::as_file)
    }

    /// Insert or wholesale replace the file record for `file.slug`.
    ///
    /// Replacing keeps the record's original position in the mapping.
    pub fn upsert_file(&mut self, file: FileNode) {
        self.content.insert(file.slug.clone(), MetadataNode::File(file));
    }
}

/// A converted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNode {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Capture time on the device.
    #[serde(default, with = "timestamp")]
    pub modified: Option<NaiveDateTime>,
    /// When the document was converted into the library.
    #[serde(default, with = "timestamp")]
    pub converted: Option<NaiveDateTime>,
    /// Artifacts present under the target directory, no duplicates.
    #[serde(default)]
    pub extensions: Vec<ArtifactKind>,
}

impl FileNode {
    pub fn has(&self, kind: ArtifactKind) -> bool {
        self.extensions.contains(&kind)
    }
}

/// Root of the persisted tree. Serializes as the bare root content mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTree {
    pub content: Content,
}

impl MetadataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path_in(target_root: &Path) -> PathBuf {
        target_root.join(METADATA_FILE)
    }

    /// Load `metadata.json` from the target root. Missing file → empty tree.
    pub fn load(target_root: &Path) -> Result<Self, MetadataError> {
        let path = Self::path_in(target_root);
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| MetadataError::Parse { path, source })
    }

    /// Pretty JSON with a trailing newline, exactly as written to disk.
    pub fn to_json(&self) -> Result<String, MetadataError> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }

    /// Rewrite `metadata.json` in full.
    pub fn save(&self, target_root: &Path) -> Result<(), MetadataError> {
        let path = Self::path_in(target_root);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, self.to_json()?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Directory at a slug path. The empty path has no directory node.
    pub fn directory(&self, path: &[&str]) -> Option<&DirectoryNode> {
        let (first, rest) = path.split_first()?;
        let mut dir = self.content.get(*first)?.as_directory()?;
        for slug in rest {
            dir = dir.content.get(*slug)?.as_directory()?;
        }
        Some(dir)
    }

    pub fn directory_mut(&mut self, path: &[&str]) -> Option<&mut DirectoryNode> {
        let (first, rest) = path.split_first()?;
        let mut dir = self.content.get_mut(*first)?.as_directory_mut()?;
        for slug in rest {
            dir = dir.content.get_mut(*slug)?.as_directory_mut()?;
        }
        Some(dir)
    }

    /// Every directory node with its `/`-joined slug path, pre-order.
    pub fn walk_directories(&self) -> Vec<(String, &DirectoryNode)> {
        let mut out = Vec::new();
        collect_directories(&self.content, "", &mut out);
        out
    }

    /// Visit every directory node mutably, pre-order.
    pub fn for_each_directory_mut<F>(&mut self, mut visit: F)
    where
        F: FnMut(&str, &mut DirectoryNode),
    {
        visit_directories_mut(&mut self.content, "", &mut visit);
    }

    /// Number of file records in the whole tree.
    pub fn file_count(&self) -> usize {
        self.walk_directories()
            .iter()
            .map(|(_, dir)| dir.files().count())
            .sum()
    }
}

fn collect_directories<'a>(
    content: &'a Content,
    base: &str,
    out: &mut Vec<(String, &'a DirectoryNode)>,
) {
    for node in content.values() {
        if let MetadataNode::Directory(dir) = node {
            let path = crate::layout::join_slug(base, &dir.slug);
            out.push((path.clone(), dir));
            collect_directories(&dir.content, &path, out);
        }
    }
}

fn visit_directories_mut<F>(content: &mut Content, base: &str, visit: &mut F)
where
    F: FnMut(&str, &mut DirectoryNode),
{
    for node in content.values_mut() {
        if let MetadataNode::Directory(dir) = node {
            let path = crate::layout::join_slug(base, &dir.slug);
            visit(&path, dir);
            visit_directories_mut(&mut dir.content, &path, visit);
        }
    }
}

/// Presentation order of a content mapping.
///
/// Directories come before files; within each kind entries are ordered by
/// case-insensitive display name. Applied recursively. Returns a new mapping
/// and leaves the input untouched.
pub fn display_order(content: &Content) -> Content {
    let mut sorted: Content = content
        .iter()
        .map(|(key, node)| {
            let node = match node {
                MetadataNode::Directory(dir) => MetadataNode::Directory(DirectoryNode {
                    content: display_order(&dir.content),
                    ..dir.clone()
                }),
                MetadataNode::File(file) => MetadataNode::File(file.clone()),
            };
            (key.clone(), node)
        })
        .collect();
    sorted.sort_by(|_, a, _, b| {
        let rank = |n: &MetadataNode| matches!(n, MetadataNode::File(_));
        rank(a)
            .cmp(&rank(b))
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
    });
    sorted
}
