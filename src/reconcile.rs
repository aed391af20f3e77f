//! Drop file records whose primary artifact was deleted from the library.
//!
//! Every directory record is checked, including directories no longer in the
//! layout. Directory records themselves are never removed here.

use crate::metadata::{MetadataNode, MetadataTree};
use crate::types::ArtifactKind;
use std::path::{Path, PathBuf};
use tracing::info;

/// A file record removed because its artifact is gone.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedRecord {
    /// Slug path of the directory that held the record.
    pub directory: String,
    pub slug: String,
    /// Artifact that was expected.
    pub artifact: PathBuf,
}

pub fn reconcile(tree: &mut MetadataTree, target_root: &Path) -> Vec<RemovedRecord> {
    let mut removed = Vec::new();
    tree.for_each_directory_mut(|path, dir| {
        let dir_path = target_root.join(path);
        dir.content.retain(|slug, node| {
            let MetadataNode::File(_) = node else {
                return true;
            };
            let artifact = dir_path.join(ArtifactKind::Pdf.file_name(slug));
            if artifact.is_file() {
                return true;
            }
            info!(artifact = %artifact.display(), "removing record of deleted document");
            removed.push(RemovedRecord {
                directory: path.to_string(),
                slug: slug.clone(),
                artifact,
            });
            false
        });
    });
    removed
}
