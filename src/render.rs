//! HTML index generation.
//!
//! Renders the library as static pages next to the converted documents:
//!
//! ```text
//! library/
//! ├── index.html                 # root index, every top-level directory
//! ├── math/
//! │   ├── index.html             # rendered while depth 1 <= index_depth
//! │   ├── algebra/
//! │   │   ├── index.html         # depth 2
//! │   │   └── groups.pdf
//! │   └── sets.pdf
//! └── metadata.json
//! ```
//!
//! A directory deeper than `site.index_depth` gets no page of its own; its
//! listing is inlined into the nearest ancestor that has one. `index.html`
//! files left behind by an earlier, deeper configuration are removed.
//!
//! Layout descriptions are Markdown. All HTML is produced with maud, so
//! names and descriptions coming from the config are escaped.

use crate::config::SiteConfig;
use crate::layout::join_slug;
use crate::metadata::{Content, DirectoryNode, FileNode, MetadataNode, MetadataTree, display_order};
use crate::types::{ArtifactKind, display_timestamp};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use pulldown_cmark::{Parser, html as md_html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to scan {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

pub const INDEX_FILE: &str = "index.html";

const CSS: &str = include_str!("../static/style.css");

/// What a render run touched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RenderSummary {
    /// Pages written, root first.
    pub written: Vec<PathBuf>,
    /// Stale subindexes deleted.
    pub removed: Vec<PathBuf>,
}

/// One step of the breadcrumb trail.
struct Crumb<'a> {
    name: &'a str,
    path: String,
}

/// Whether a directory at `depth` (top level = 1) gets its own page.
pub fn has_own_page(depth: usize, index_depth: i32) -> bool {
    index_depth < 0 || depth <= index_depth as usize
}

/// Render every index page of the library into `target_root`.
///
/// The tree is put in display order first; the persisted tree is left as is.
pub fn render_index(
    site: &SiteConfig,
    tree: &MetadataTree,
    target_root: &Path,
) -> Result<RenderSummary, RenderError> {
    info!(target = %target_root.display(), "rendering index");
    let ordered = display_order(&tree.content);
    let mut summary = RenderSummary::default();

    let root_page = render_page(site, &[], None, &ordered);
    let root_index = target_root.join(INDEX_FILE);
    fs::write(&root_index, root_page.into_string())?;
    summary.written.push(root_index);

    let mut trail = Vec::new();
    render_subindexes(site, &ordered, "", 1, &mut trail, target_root, &mut summary)?;

    summary.removed = remove_stale_subindexes(target_root, site.index_depth)?;
    info!(
        written = summary.written.len(),
        removed = summary.removed.len(),
        "index rendered"
    );
    Ok(summary)
}

fn render_subindexes<'a>(
    site: &SiteConfig,
    content: &'a Content,
    parent: &str,
    depth: usize,
    trail: &mut Vec<Crumb<'a>>,
    target_root: &Path,
    summary: &mut RenderSummary,
) -> Result<(), RenderError> {
    if !has_own_page(depth, site.index_depth) {
        return Ok(());
    }
    for node in content.values() {
        let MetadataNode::Directory(dir) = node else {
            continue;
        };
        let path = join_slug(parent, &dir.slug);
        trail.push(Crumb {
            name: &dir.name,
            path: path.clone(),
        });

        let page = render_page(site, trail, Some(dir), &dir.content);
        let dir_path = target_root.join(&path);
        fs::create_dir_all(&dir_path)?;
        let index = dir_path.join(INDEX_FILE);
        fs::write(&index, page.into_string())?;
        debug!(page = %index.display(), "wrote subindex");
        summary.written.push(index);

        render_subindexes(site, &dir.content, &path, depth + 1, trail, target_root, summary)?;
        trail.pop();
    }
    Ok(())
}

/// Delete `index.html` files in directories deeper than `index_depth`.
fn remove_stale_subindexes(target_root: &Path, index_depth: i32) -> Result<Vec<PathBuf>, RenderError> {
    let mut removed = Vec::new();
    if index_depth < 0 {
        return Ok(removed);
    }
    // The root index sits at walk depth 1; a directory at depth d holds its
    // index at walk depth d + 1.
    let min_depth = index_depth as usize + 2;
    for entry in WalkDir::new(target_root).min_depth(min_depth).sort_by_file_name() {
        let entry = entry.map_err(|source| RenderError::Walk {
            path: target_root.to_path_buf(),
            source,
        })?;
        if entry.file_type().is_file() && entry.file_name() == INDEX_FILE {
            fs::remove_file(entry.path())?;
            info!(page = %entry.path().display(), "removed stale subindex");
            removed.push(entry.into_path());
        }
    }
    Ok(removed)
}

// ============================================================================
// HTML Components
// ============================================================================

/// Join a library-relative path onto the configured base URL.
fn site_url(base_url: &str, relative: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), relative)
}

fn markdown(text: &str) -> Markup {
    let mut out = String::new();
    md_html::push_html(&mut out, Parser::new(text));
    PreEscaped(out)
}

fn base_document(site: &SiteConfig, title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang=(site.language) {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                @if !site.author.is_empty() {
                    meta name="author" content=(site.author);
                }
                title { (title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (content)
            }
        }
    }
}

fn breadcrumb(site: &SiteConfig, trail: &[Crumb]) -> Markup {
    html! {
        nav.breadcrumb {
            @if trail.is_empty() {
                span.current { (site.title) }
            } @else {
                a href=(site_url(&site.base_url, "")) { (site.title) }
            }
            @for (idx, crumb) in trail.iter().enumerate() {
                span.separator { "/" }
                @if idx + 1 == trail.len() {
                    span.current { (crumb.name) }
                } @else {
                    a href=(site_url(&site.base_url, &format!("{}/", crumb.path))) { (crumb.name) }
                }
            }
        }
    }
}

fn file_entry(site: &SiteConfig, parent: &str, file: &FileNode) -> Markup {
    let link = |kind: ArtifactKind| site_url(&site.base_url, &join_slug(parent, &kind.file_name(&file.slug)));
    html! {
        li.document {
            a.document-link href=(link(ArtifactKind::Pdf)) { (file.name) }
            @if file.has(ArtifactKind::Sdocx) {
                " "
                a.note-link href=(link(ArtifactKind::Sdocx)) title="Samsung Notes" { "sdocx" }
            }
            span.modified { (display_timestamp(file.modified.as_ref())) }
            @if !file.description.is_empty() {
                div.description { (markdown(&file.description)) }
            }
        }
    }
}

/// Listing of one directory's content. Directories with their own page are
/// links; deeper ones are expanded in place.
fn listing(site: &SiteConfig, parent: &str, depth: usize, content: &Content) -> Markup {
    html! {
        ul.listing {
            @for node in content.values() {
                @match node {
                    MetadataNode::File(file) => {
                        (file_entry(site, parent, file))
                    }
                    MetadataNode::Directory(dir) => {
                        @let path = join_slug(parent, &dir.slug);
                        @if has_own_page(depth, site.index_depth) {
                            li.directory {
                                a href=(site_url(&site.base_url, &format!("{path}/"))) { (dir.name) }
                                @if !dir.description.is_empty() {
                                    div.description { (markdown(&dir.description)) }
                                }
                            }
                        } @else {
                            li.directory.inline {
                                span.directory-name { (dir.name) }
                                @if !dir.description.is_empty() {
                                    div.description { (markdown(&dir.description)) }
                                }
                                (listing(site, &path, depth + 1, &dir.content))
                            }
                        }
                    }
                }
            }
        }
    }
}

// ============================================================================
// Page Renderers
// ============================================================================

fn render_page(site: &SiteConfig, trail: &[Crumb], dir: Option<&DirectoryNode>, content: &Content) -> Markup {
    let parent = trail.last().map(|c| c.path.as_str()).unwrap_or("");
    let (heading, description) = match dir {
        Some(dir) => (dir.name.as_str(), dir.description.as_str()),
        None => (site.title.as_str(), site.description.as_str()),
    };
    let title = match dir {
        Some(dir) => format!("{} · {}", dir.name, site.title),
        None => site.title.clone(),
    };

    let body = html! {
        header.site-header {
            (breadcrumb(site, trail))
        }
        main.index-page {
            h1 { (heading) }
            @if !description.is_empty() {
                div.description { (markdown(description)) }
            }
            @if content.is_empty() {
                p.empty { "Nothing here yet." }
            } @else {
                (listing(site, parent, trail.len() + 1, content))
            }
        }
        @if !site.author.is_empty() {
            footer.site-footer { (site.author) }
        }
    };

    base_document(site, &title, body)
}
