//! Centralized name handling: slugs and the scanner filename convention.
//!
//! Two kinds of names flow through the library:
//!
//! - **Display names** (layout categories, document titles) become slugs via
//!   [`slugify`]. A slug is both the metadata key and the on-disk path segment,
//!   so the same title always lands at the same place.
//! - **Source filenames** written by the note-taking device follow
//!   `<title>[_<yyMMdd>_<HHmmss>][ (<n>)].pdf`. [`parse_source_filename`]
//!   splits them into a title and a capture timestamp.
//!
//! ## Source filename examples
//!
//! | Filename | Title | Modified |
//! |---|---|---|
//! | `Algebra_240115_093000.pdf` | `Algebra` | 2024-01-15 09:30:00 |
//! | `Algebra_240115_093000 (2).pdf` | `Algebra` | 2024-01-15 09:30:00 |
//! | `Linear_Maps_240115_093000.pdf` | `Linear_Maps` | 2024-01-15 09:30:00 |
//! | `Scratch.pdf` | `Scratch` | file mtime |
//! | `Scratch_notes.pdf` | `Scratch_notes` | file mtime |

use chrono::NaiveDateTime;

/// Extension (lowercase, with dot) of the documents the device produces.
pub const SOURCE_EXTENSION: &str = ".pdf";

/// Convert a display name into a filesystem- and URL-safe identifier.
///
/// Non-ASCII characters are transliterated, everything is lowercased, and runs
/// of non-alphanumeric characters collapse into a single `-`:
/// - `"Linear Algebra"` → `"linear-algebra"`
/// - `"Übungen_2024"` → `"ubungen-2024"`
/// - `"  Notes!!  "` → `"notes"`
pub fn slugify(text: &str) -> String {
    slug::slugify(text)
}

/// Whether a directory entry looks like a device document (`*.pdf`, any case).
pub fn is_source_document(file_name: &str) -> bool {
    file_name.len() > SOURCE_EXTENSION.len()
        && file_name
            .get(file_name.len() - SOURCE_EXTENSION.len()..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(SOURCE_EXTENSION))
}

/// Remove a single trailing ` (<digits>)` duplicate counter.
///
/// Sync clients append it when a file with the same name already exists:
/// `"Algebra (3)"` → `"Algebra"`. Anything else is returned unchanged.
pub fn strip_duplicate_suffix(stem: &str) -> &str {
    let Some(inner) = stem.strip_suffix(')') else {
        return stem;
    };
    let Some((base, counter)) = inner.rsplit_once(" (") else {
        return stem;
    };
    if !counter.is_empty() && counter.bytes().all(|b| b.is_ascii_digit()) {
        base
    } else {
        stem
    }
}

/// Result of parsing a device filename.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFilenameRecord {
    /// Document title. Falls back to the whole stripped stem.
    pub title: String,
    /// Capture time from the filename, or the fallback timestamp.
    pub modified: NaiveDateTime,
    /// `true` when `modified` came from the filename itself.
    pub from_filename: bool,
}

/// Parse `<title>_<yyMMdd>_<HHmmss>` out of a device filename.
///
/// `fallback` (normally the file's mtime) is used when the name does not carry
/// a valid timestamp; in that case the title is the entire stem with only the
/// duplicate counter removed.
pub fn parse_source_filename(file_name: &str, fallback: NaiveDateTime) -> SourceFilenameRecord {
    let stem = file_name
        .get(..file_name.len().saturating_sub(SOURCE_EXTENSION.len()))
        .filter(|_| is_source_document(file_name))
        .unwrap_or(file_name);
    let stem = strip_duplicate_suffix(stem);

    match split_timestamp(stem) {
        Some((title, modified)) => SourceFilenameRecord {
            title: title.to_string(),
            modified,
            from_filename: true,
        },
        None => SourceFilenameRecord {
            title: stem.to_string(),
            modified: fallback,
            from_filename: false,
        },
    }
}

/// Split from the right into at most three `_`-delimited parts and read the
/// last two as a compact date and time.
fn split_timestamp(stem: &str) -> Option<(&str, NaiveDateTime)> {
    let mut parts = stem.rsplitn(3, '_');
    let time = parts.next()?;
    let date = parts.next()?;
    let title = parts.next()?;

    if !is_six_digits(date) || !is_six_digits(time) {
        return None;
    }
    let modified =
        NaiveDateTime::parse_from_str(&format!("{date}-{time}"), "%y%m%d-%H%M%S").ok()?;
    Some((title, modified))
}

fn is_six_digits(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}
