//! Definition schema content and its digest.

use serde::{Deserialize, Serialize};

use crate::checksums::md5_hex;

/// Schema text of a definition, kept as its original lines, plus the digest
/// used to detect definition mismatch between client and server.
///
/// The digest is the MD5 of the lines joined with `\n` and a trailing
/// newline. A client that only knows the digest of its compiled-in schema
/// sends a digest-only value; the server then serves its own schema text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefContent {
    lines: Vec<String>,
    digest: String,
}

impl DefContent {
    /// Builds content from schema lines, computing the digest.
    #[must_use]
    pub fn from_lines(lines: Vec<String>) -> Self {
        let digest = md5_hex(Self::canonical_text(&lines).as_bytes());
        Self { lines, digest }
    }

    /// Content known only by digest; the schema text is unavailable locally.
    #[must_use]
    pub fn digest_only(digest: impl Into<String>) -> Self {
        Self {
            lines: Vec::new(),
            digest: digest.into().to_ascii_lowercase(),
        }
    }

    /// Content for a client that carries no schema at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            lines: Vec::new(),
            digest: String::new(),
        }
    }

    /// The schema lines, empty for digest-only content.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// The lowercase hex digest, empty when the content is empty.
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// True when neither lines nor a digest are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.digest.is_empty()
    }

    fn canonical_text(lines: &[String]) -> String {
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }
}

impl Default for DefContent {
    fn default() -> Self {
        Self::empty()
    }
}
