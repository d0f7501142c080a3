//! Payload wire form and LZ4 compression.

use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::payload::ConfigPayload;

/// Upper bound accepted for a declared uncompressed length. Declared lengths
/// come from the wire and are checked before any buffer is allocated.
pub const MAX_UNCOMPRESSED_LEN: u64 = 256 * 1024 * 1024;

/// Compression algorithm applied to payload bytes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionType {
    /// Bytes travel as-is.
    #[default]
    None,
    /// LZ4 block compression.
    Lz4,
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionType::None => write!(f, "none"),
            CompressionType::Lz4 => write!(f, "lz4"),
        }
    }
}

/// Compression state of a payload: the algorithm and the byte length the data
/// decompresses to. The length is carried on the wire because LZ4 block
/// decompression needs the output size up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionInfo {
    /// Algorithm the data is encoded with.
    pub compression: CompressionType,
    /// Length of the decompressed content in bytes.
    pub uncompressed_len: u64,
}

impl CompressionInfo {
    /// State of uncompressed data of the given length.
    #[must_use]
    pub fn uncompressed(len: u64) -> Self {
        Self {
            compression: CompressionType::None,
            uncompressed_len: len,
        }
    }
}

/// Errors raised when payload bytes cannot be decoded.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// The LZ4 block did not decompress to the declared length.
    #[error("lz4 decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),
    /// The decompressed content is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    /// The declared uncompressed length is beyond what we will allocate.
    #[error("declared uncompressed length {declared} exceeds limit {limit}")]
    LengthLimit {
        /// Length the wire declared.
        declared: u64,
        /// The accepted maximum.
        limit: u64,
    },
}

/// Payload bytes as they travel on the wire, with their compression state.
///
/// Conversion between compressed and uncompressed forms is content-preserving
/// and idempotent. Equality and hashing are defined on the decompressed
/// content, so two payloads carrying the same config compare equal even when
/// one is compressed and the other is not.
#[derive(Debug, Clone)]
pub struct Payload {
    data: Vec<u8>,
    info: CompressionInfo,
}

impl Payload {
    /// Wraps bytes that are not compressed.
    #[must_use]
    pub fn uncompressed(data: Vec<u8>) -> Self {
        let info = CompressionInfo::uncompressed(data.len() as u64);
        Self { data, info }
    }

    /// Canonical bytes of a value tree, uncompressed.
    #[must_use]
    pub fn from_config(payload: &ConfigPayload) -> Self {
        Self::uncompressed(payload.canonical_bytes())
    }

    /// Canonical bytes of a value tree, encoded with the target algorithm.
    #[must_use]
    pub fn from_config_compressed(payload: &ConfigPayload, target: CompressionType) -> Self {
        let canonical = payload.canonical_bytes();
        match target {
            CompressionType::None => Self::uncompressed(canonical),
            CompressionType::Lz4 => {
                let info = CompressionInfo {
                    compression: CompressionType::Lz4,
                    uncompressed_len: canonical.len() as u64,
                };
                Self {
                    data: lz4_flex::block::compress(&canonical),
                    info,
                }
            }
        }
    }

    /// Reconstructs a payload from wire bytes and the compression state the
    /// envelope declared. The declaration is trusted here; a wrong algorithm
    /// or length surfaces as a decode failure when the content is read.
    #[must_use]
    pub fn from_wire(data: Vec<u8>, info: CompressionInfo) -> Self {
        Self { data, info }
    }

    /// The compression state.
    #[must_use]
    pub fn info(&self) -> CompressionInfo {
        self.info
    }

    /// The wire bytes in their current encoding.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length of the wire bytes in their current encoding.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True when the wire byte section is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Re-encodes to the target algorithm.
    ///
    /// A no-op when already in the target state; otherwise decompresses
    /// first, then re-compresses if the target requires it.
    ///
    /// # Errors
    ///
    /// Fails when the current bytes cannot be decompressed.
    pub fn with_compression(&self, target: CompressionType) -> Result<Payload, PayloadError> {
        if self.info.compression == target {
            return Ok(self.clone());
        }
        let content = self.decompressed()?.into_owned();
        match target {
            CompressionType::None => Ok(Self::uncompressed(content)),
            CompressionType::Lz4 => {
                let info = CompressionInfo {
                    compression: CompressionType::Lz4,
                    uncompressed_len: content.len() as u64,
                };
                Ok(Self {
                    data: lz4_flex::block::compress(&content),
                    info,
                })
            }
        }
    }

    /// The decompressed content bytes.
    ///
    /// # Errors
    ///
    /// Fails when the declared length is over [`MAX_UNCOMPRESSED_LEN`] or the
    /// LZ4 block is malformed.
    pub fn decompressed(&self) -> Result<Cow<'_, [u8]>, PayloadError> {
        match self.info.compression {
            CompressionType::None => Ok(Cow::Borrowed(&self.data)),
            CompressionType::Lz4 => {
                if self.info.uncompressed_len > MAX_UNCOMPRESSED_LEN {
                    return Err(PayloadError::LengthLimit {
                        declared: self.info.uncompressed_len,
                        limit: MAX_UNCOMPRESSED_LEN,
                    });
                }
                let out =
                    lz4_flex::block::decompress(&self.data, self.info.uncompressed_len as usize)?;
                Ok(Cow::Owned(out))
            }
        }
    }

    /// Parses the decompressed content as a value tree.
    ///
    /// # Errors
    ///
    /// Fails when decompression fails or the content is not valid JSON.
    pub fn to_config(&self) -> Result<ConfigPayload, PayloadError> {
        let bytes = self.decompressed()?;
        Ok(ConfigPayload::from_slice(&bytes)?)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        match (self.decompressed(), other.decompressed()) {
            (Ok(a), Ok(b)) => a == b,
            _ => self.info == other.info && self.data == other.data,
        }
    }
}

impl Eq for Payload {}

impl Hash for Payload {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.decompressed() {
            Ok(bytes) => bytes.hash(state),
            Err(_) => self.data.hash(state),
        }
    }
}
