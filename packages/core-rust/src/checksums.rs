//! Content digests for canonical payload bytes.
//!
//! Every served payload is content-addressed by up to two digests, MD5 and
//! XXHASH64, both computed over the canonical uncompressed serialization.
//! Requests carry the client's baseline digests; responses carry the digests
//! of the content the server resolved. Comparing the two per type is how a
//! client detects that its configuration changed without decoding payloads.

use std::fmt;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

/// Digest algorithms used for content-addressing payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumType {
    /// 128-bit MD5, rendered as 32 hex digits.
    Md5,
    /// 64-bit XXHASH64 with seed 0, rendered as 16 hex digits.
    XxHash64,
}

impl ChecksumType {
    /// Number of hex digits a digest of this type renders to.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            ChecksumType::Md5 => 32,
            ChecksumType::XxHash64 => 16,
        }
    }

    /// Parses the wire name of an algorithm, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<ChecksumType> {
        match name.to_ascii_lowercase().as_str() {
            "md5" => Some(ChecksumType::Md5),
            "xxhash64" => Some(ChecksumType::XxHash64),
            _ => None,
        }
    }
}

impl fmt::Display for ChecksumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChecksumType::Md5 => write!(f, "md5"),
            ChecksumType::XxHash64 => write!(f, "xxhash64"),
        }
    }
}

/// Hex MD5 digest of `bytes`.
#[must_use]
pub fn md5_hex(bytes: &[u8]) -> String {
    hex::encode(Md5::digest(bytes))
}

/// Hex XXHASH64 digest of `bytes`, zero-padded to 16 digits.
#[must_use]
pub fn xxhash64_hex(bytes: &[u8]) -> String {
    format!("{:016x}", XxHash64::oneshot(0, bytes))
}

/// One computed digest together with the algorithm that produced it.
///
/// Values are normalized to lowercase hex so that equality is textual.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigChecksum {
    /// Algorithm the value was computed with.
    #[serde(rename = "type")]
    pub kind: ChecksumType,
    /// Lowercase hex digest.
    pub value: String,
}

impl ConfigChecksum {
    /// Wraps an externally supplied digest, normalizing the hex to lowercase.
    #[must_use]
    pub fn new(kind: ChecksumType, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into().to_ascii_lowercase(),
        }
    }

    /// Computes the digest of `bytes` with the given algorithm.
    #[must_use]
    pub fn compute(kind: ChecksumType, bytes: &[u8]) -> Self {
        let value = match kind {
            ChecksumType::Md5 => md5_hex(bytes),
            ChecksumType::XxHash64 => xxhash64_hex(bytes),
        };
        Self { kind, value }
    }

    /// True when the value has the hex length and alphabet of its algorithm.
    #[must_use]
    pub fn has_valid_format(&self) -> bool {
        self.value.len() == self.kind.hex_len()
            && self.value.bytes().all(|b| b.is_ascii_hexdigit())
    }
}

impl fmt::Display for ConfigChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.value)
    }
}

/// How populated a [`PayloadChecksums`] set is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumState {
    /// Neither digest present.
    Empty,
    /// Exactly one digest present.
    Partial,
    /// Both digests present.
    Full,
}

/// The pair of optional content digests carried by requests and responses.
///
/// A set holds at most one digest per [`ChecksumType`]. Update detection
/// compares two sets per type: only types present on both sides participate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PayloadChecksums {
    md5: Option<ConfigChecksum>,
    xxhash64: Option<ConfigChecksum>,
}

impl PayloadChecksums {
    /// The set with neither digest present.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Computes both digests over `bytes`.
    #[must_use]
    pub fn compute_full(bytes: &[u8]) -> Self {
        let mut checksums = Self::empty();
        checksums.insert(ConfigChecksum::compute(ChecksumType::Md5, bytes));
        checksums.insert(ConfigChecksum::compute(ChecksumType::XxHash64, bytes));
        checksums
    }

    /// Computes over `bytes` exactly the digest types present in `self`.
    ///
    /// An empty set yields an empty set; no type is silently added.
    #[must_use]
    pub fn compute_matching(&self, bytes: &[u8]) -> Self {
        let mut checksums = Self::empty();
        for present in self.iter() {
            checksums.insert(ConfigChecksum::compute(present.kind, bytes));
        }
        checksums
    }

    /// Adds a digest, replacing any previous digest of the same type.
    pub fn insert(&mut self, checksum: ConfigChecksum) {
        match checksum.kind {
            ChecksumType::Md5 => self.md5 = Some(checksum),
            ChecksumType::XxHash64 => self.xxhash64 = Some(checksum),
        }
    }

    /// The digest of the given type, when present.
    #[must_use]
    pub fn get(&self, kind: ChecksumType) -> Option<&ConfigChecksum> {
        match kind {
            ChecksumType::Md5 => self.md5.as_ref(),
            ChecksumType::XxHash64 => self.xxhash64.as_ref(),
        }
    }

    /// True when no digest is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.md5.is_none() && self.xxhash64.is_none()
    }

    /// Classifies the set as empty, partial or full.
    #[must_use]
    pub fn state(&self) -> ChecksumState {
        match (&self.md5, &self.xxhash64) {
            (None, None) => ChecksumState::Empty,
            (Some(_), Some(_)) => ChecksumState::Full,
            _ => ChecksumState::Partial,
        }
    }

    /// True when `self` holds exactly the same digest types as `other`,
    /// ignoring values.
    #[must_use]
    pub fn same_types(&self, other: &Self) -> bool {
        self.md5.is_some() == other.md5.is_some()
            && self.xxhash64.is_some() == other.xxhash64.is_some()
    }

    /// Per-type comparison for update detection.
    ///
    /// True when at least one digest type is present on both sides and every
    /// shared type carries the same value. Two sets with no shared type never
    /// match, so an empty baseline is always treated as changed content.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        let mut shared = 0;
        for kind in [ChecksumType::Md5, ChecksumType::XxHash64] {
            if let (Some(a), Some(b)) = (self.get(kind), other.get(kind)) {
                if a.value != b.value {
                    return false;
                }
                shared += 1;
            }
        }
        shared > 0
    }

    /// Iterates present digests in a fixed (MD5 first) order.
    pub fn iter(&self) -> impl Iterator<Item = &ConfigChecksum> {
        self.md5.iter().chain(self.xxhash64.iter())
    }
}

impl FromIterator<ConfigChecksum> for PayloadChecksums {
    fn from_iter<I: IntoIterator<Item = ConfigChecksum>>(iter: I) -> Self {
        let mut checksums = Self::empty();
        for checksum in iter {
            checksums.insert(checksum);
        }
        checksums
    }
}

impl fmt::Display for PayloadChecksums {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for checksum in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{checksum}")?;
            first = false;
        }
        if first {
            write!(f, "(empty)")?;
        }
        Ok(())
    }
}
