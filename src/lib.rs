//! # Scribeshelf
//!
//! Turns the PDFs a note-taking tablet exports into a browsable library.
//! Scans arrive in a source tree that mirrors a configured category layout;
//! each one is re-cut into pages of a fixed physical height, filed under a
//! slug in the target tree, recorded in `metadata.json`, and listed on static
//! HTML index pages.
//!
//! # Architecture: One Serialized Pass
//!
//! Every trigger (CLI `process`, a new scan, a deleted artifact, an edited
//! config) runs the same read-modify-write cycle in [`pass`]:
//!
//! ```text
//! config.toml ─┐
//!              ├─ sync ─→ ingest ─→ reconcile ─→ metadata.json ─→ render
//! metadata ────┘           │                                      │
//!                          └─ repaginate + extract                └─ index.html
//! ```
//!
//! Only one pass runs at a time, and `metadata.json` is rewritten only when
//! something changed, so repeated passes over an unchanged library are no-ops.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `config.toml` loading, merging onto stock defaults, validation |
//! | [`layout`] | Configured category tree and its on-disk mirror |
//! | [`naming`] | Slugs and `<title>_<yyMMdd>_<HHmmss>.pdf` filename parsing |
//! | [`types`] | Artifact kinds and timestamp formats shared across modules |
//! | [`metadata`] | The persisted library tree and its display ordering |
//! | [`sync`] | Walks the layout, creating and refreshing directory records |
//! | [`repaginate`] | Flatten, find blank bands, cut to page height, re-export |
//! | [`extract`] | Pulls embedded Samsung Notes data out of a source PDF |
//! | [`ingest`] | Converts waiting documents, isolating per-document failures |
//! | [`reconcile`] | Drops records whose artifact was deleted |
//! | [`render`] | Static HTML index pages with Maud |
//! | [`hooks`] | Shell commands run before and after each pass |
//! | [`pass`] | The serialized pass tying everything together |
//! | [`watch`] | Filesystem event loop for daemon mode |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Cut Only Inside Blank Bands
//!
//! Handwriting must never be sliced through. Repagination computes a
//! per-row ink intensity, smooths it with a windowed median, and only cuts
//! inside bands that stay blank for a minimum height. When no band fits the
//! page budget, a page grows longer rather than cutting through content.
//!
//! ## Slugs Are Identity
//!
//! A document's slug, derived from its title, names both its artifacts and
//! its metadata record. Re-exporting a note under the same title replaces the
//! earlier version wholesale instead of piling up duplicates.
//!
//! ## Consume Sources Last
//!
//! A source document is deleted only after every artifact is in place, and
//! artifacts are staged under a hidden name until complete. A failed
//! conversion leaves the source behind for the next pass and never leaves a
//! half-written file under its final name.

pub mod config;
pub mod extract;
pub mod hooks;
pub mod ingest;
pub mod layout;
pub mod logging;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod pass;
pub mod reconcile;
pub mod render;
pub mod repaginate;
pub mod sync;
pub mod types;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
