//! Embedded note extraction.
//!
//! Samsung Notes exports a PDF that carries the editable note alongside the
//! rendered pages. The payload lives in the document catalog:
//!
//! ```text
//! /Root
//! └── /PieceInfo
//!     └── /SPenSDK_PAGE_SINGLE  (or /SPenSDK_PAGE_LIST for multi-page notes)
//!         └── /Private
//!             └── /Bin0  stream → the .sdocx file
//! ```
//!
//! Extraction always reads the original source, never the repaginated copy.
//! A document without the payload is normal, not an error.

use crate::repaginate::staging_path;
use lopdf::{Dictionary, Document, Object, Stream};
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse {path}: {message}")]
    Pdf { path: String, message: String },
    #[error("cannot decode note stream in {path}: {message}")]
    Decode { path: String, message: String },
}

/// Pulls a secondary artifact out of a source document.
pub trait NoteExtractor {
    /// Write the embedded note of `source` to `destination`.
    ///
    /// Returns `Ok(false)` when the document carries no note.
    fn extract(&self, source: &Path, destination: &Path) -> Result<bool, ExtractError>;
}

/// Never finds anything.
pub struct NoExtractor;

impl NoteExtractor for NoExtractor {
    fn extract(&self, _source: &Path, _destination: &Path) -> Result<bool, ExtractError> {
        Ok(false)
    }
}

/// Samsung Notes (`.sdocx`) extractor.
pub struct SpenExtractor;

/// Catalog entries tried in order.
const PAGE_KEYS: [&[u8]; 2] = [b"SPenSDK_PAGE_SINGLE", b"SPenSDK_PAGE_LIST"];

impl SpenExtractor {
    fn payload_stream(document: &Document) -> Option<&Stream> {
        let catalog = document.catalog().ok()?;
        let piece_info = lookup(document, catalog, b"PieceInfo")?.as_dict().ok()?;
        let (key, page) = PAGE_KEYS.iter().find_map(|key| {
            lookup(document, piece_info, key)
                .and_then(|o| o.as_dict().ok())
                .map(|page| (*key, page))
        })?;
        debug!(entry = %String::from_utf8_lossy(key), "found note entry");

        let private = lookup(document, page, b"Private")?.as_dict().ok()?;
        lookup(document, private, b"Bin0")?.as_stream().ok()
    }
}

/// Decoded stream bytes. Unfiltered streams are taken as stored.
fn stream_bytes(stream: &Stream, source: &Path) -> Result<Vec<u8>, ExtractError> {
    if !stream.dict.has(b"Filter") {
        return Ok(stream.content.clone());
    }
    let decode_error = |message: String| ExtractError::Decode {
        path: source.display().to_string(),
        message,
    };
    let data = stream
        .decompressed_content()
        .map_err(|e| decode_error(e.to_string()))?;
    // lopdf swallows inflate errors and hands back nothing
    if data.is_empty() && !stream.content.is_empty() {
        return Err(decode_error("filter produced no data".to_string()));
    }
    Ok(data)
}

fn lookup<'a>(document: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    let object = dict.get(key).ok()?;
    document.dereference(object).ok().map(|(_, o)| o)
}

impl NoteExtractor for SpenExtractor {
    fn extract(&self, source: &Path, destination: &Path) -> Result<bool, ExtractError> {
        let document = Document::load(source).map_err(|e| ExtractError::Pdf {
            path: source.display().to_string(),
            message: e.to_string(),
        })?;
        let Some(stream) = Self::payload_stream(&document) else {
            info!(source = %source.display(), "no Samsung Notes data");
            return Ok(false);
        };
        let data = stream_bytes(stream, source)?;

        let staged = staging_path(destination);
        fs::write(&staged, &data)?;
        fs::rename(&staged, destination)?;
        Ok(true)
    }
}
