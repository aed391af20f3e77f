//! Shared types used by the metadata tree, the ingest pipeline and the renderer.
//!
//! These are serialized into `metadata.json` and must stay stable across
//! releases: existing libraries are read back on every pass.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of artifact produced for a converted document.
///
/// The serialized name doubles as the file extension under the target
/// directory: `<slug>.pdf`, `<slug>.sdocx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Repaginated (or copied) primary document.
    Pdf,
    /// Samsung Notes payload extracted from the source PDF.
    Sdocx,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Pdf => "pdf",
            ArtifactKind::Sdocx => "sdocx",
        }
    }

    /// File name of this artifact for a slug.
    pub fn file_name(self, slug: &str) -> String {
        format!("{}.{}", slug, self.extension())
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Storage format of timestamps inside `metadata.json`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Human-facing timestamp format used by the index pages.
pub const DISPLAY_TIMESTAMP_FORMAT: &str = "%d. %m. %Y, %H:%M:%S";

/// Serde adapter for `Option<NaiveDateTime>` in [`TIMESTAMP_FORMAT`].
pub mod timestamp {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<NaiveDateTime>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_str(&v.format(TIMESTAMP_FORMAT).to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

/// Format a stored timestamp for display, empty when absent.
pub fn display_timestamp(value: Option<&NaiveDateTime>) -> String {
    value
        .map(|v| v.format(DISPLAY_TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}
