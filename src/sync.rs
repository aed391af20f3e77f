//! Tree synchronizer: brings the Metadata Tree in line with the layout.
//!
//! [`LayoutWalk`] visits every layout node depth-first in declaration order.
//! Before a node is handed out, its directory record is created (if missing)
//! and its `name` / `description` refreshed from the layout. The record's
//! `content` is never replaced, so file records survive renames of the
//! category's display name.
//!
//! The walk is lazy: the ingest pipeline pulls one directory, converts the
//! documents waiting in it, then pulls the next. A consumer that only drains
//! the walk (see [`synchronize`]) leaves the tree structurally complete.
//!
//! Directories that are no longer in the layout are kept. [`prune_orphans`]
//! removes them and is only called when the operator opted in.

use crate::layout::{LayoutNode, join_slug, layout_paths};
use crate::metadata::{Content, DirectoryNode, MetadataNode, MetadataTree};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum SyncError {
    #[error("{path} is recorded as a file but the layout declares a directory there")]
    NotADirectory { path: String },
    #[error("layout name {name:?} has no usable characters for a directory name")]
    EmptySlug { name: String },
}

struct Frame<'l> {
    nodes: std::slice::Iter<'l, LayoutNode>,
    parent: Vec<String>,
}

/// Lazy pre-order walk over the layout that materializes directory records.
///
/// This is a lending iterator: each yielded `&mut DirectoryNode` borrows the
/// walk, so it must be released before asking for the next one.
pub struct LayoutWalk<'l, 't> {
    tree: &'t mut MetadataTree,
    stack: Vec<Frame<'l>>,
    changed: bool,
}

impl<'l, 't> LayoutWalk<'l, 't> {
    pub fn new(layouts: &'l [LayoutNode], tree: &'t mut MetadataTree) -> Self {
        Self {
            tree,
            stack: vec![Frame {
                nodes: layouts.iter(),
                parent: Vec::new(),
            }],
            changed: false,
        }
    }

    /// Whether any directory record was created or refreshed with new values.
    pub fn changed(&self) -> bool {
        self.changed
    }

    /// Advance to the next layout node.
    ///
    /// Yields the `/`-joined slug path and the directory record. On error the
    /// node's children are skipped and the walk can be continued.
    pub fn next_dir(&mut self) -> Option<Result<(String, &mut DirectoryNode), SyncError>> {
        let (layout, parent) = loop {
            let frame = self.stack.last_mut()?;
            match frame.nodes.next() {
                Some(node) => break (node, frame.parent.clone()),
                None => {
                    self.stack.pop();
                }
            }
        };

        let slug = layout.slug();
        if slug.is_empty() {
            return Some(Err(SyncError::EmptySlug {
                name: layout.name.clone(),
            }));
        }
        let path = join_slug(&parent.join("/"), &slug);

        let content: &mut Content = if parent.is_empty() {
            &mut self.tree.content
        } else {
            let parent_path: Vec<&str> = parent.iter().map(String::as_str).collect();
            match self.tree.directory_mut(&parent_path) {
                Some(dir) => &mut dir.content,
                None => return Some(Err(SyncError::NotADirectory { path })),
            }
        };

        if !content.contains_key(&slug) {
            content.insert(
                slug.clone(),
                MetadataNode::Directory(DirectoryNode::new(slug.clone(), layout.name.clone())),
            );
            self.changed = true;
        }
        let dir = match content.get_mut(&slug) {
            Some(MetadataNode::Directory(dir)) => dir,
            _ => return Some(Err(SyncError::NotADirectory { path })),
        };
        if dir.name != layout.name {
            dir.name.clone_from(&layout.name);
            self.changed = true;
        }
        if dir.description != layout.description {
            dir.description.clone_from(&layout.description);
            self.changed = true;
        }

        if !layout.content.is_empty() {
            let mut child_parent = parent;
            child_parent.push(slug);
            self.stack.push(Frame {
                nodes: layout.content.iter(),
                parent: child_parent,
            });
        }

        Some(Ok((path, dir)))
    }
}

/// Drain a full walk. Returns whether the tree changed.
pub fn synchronize(layouts: &[LayoutNode], tree: &mut MetadataTree) -> Result<bool, SyncError> {
    let mut walk = LayoutWalk::new(layouts, tree);
    while let Some(step) = walk.next_dir() {
        step?;
    }
    Ok(walk.changed())
}

/// Remove directory records whose path is not declared by the layout.
///
/// File records at declared paths are never touched. Returns the removed
/// directory paths.
pub fn prune_orphans(layouts: &[LayoutNode], tree: &mut MetadataTree) -> Vec<String> {
    let declared: HashSet<String> = layout_paths(layouts).into_iter().collect();
    let mut removed = Vec::new();
    prune_content(&mut tree.content, "", &declared, &mut removed);
    removed
}

fn prune_content(
    content: &mut Content,
    base: &str,
    declared: &HashSet<String>,
    removed: &mut Vec<String>,
) {
    content.retain(|slug, node| match node {
        MetadataNode::Directory(_) => {
            let path = join_slug(base, slug);
            if declared.contains(&path) {
                true
            } else {
                removed.push(path);
                false
            }
        }
        MetadataNode::File(_) => true,
    });
    for (slug, node) in content.iter_mut() {
        if let MetadataNode::Directory(dir) = node {
            prune_content(&mut dir.content, &join_slug(base, slug), declared, removed);
        }
    }
}
