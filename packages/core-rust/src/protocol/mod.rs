//! Versioned request/response wire protocol.
//!
//! One RPC method family carries config requests and their responses. A wire
//! frame is a length-prefixed JSON envelope followed by raw payload bytes:
//!
//! ```text
//! [u32 BE envelope length][envelope JSON][payload bytes]
//! ```
//!
//! Requests have an empty payload section. Success responses carry the
//! payload bytes there, encoded per the envelope's `compressionInfo`; an
//! empty section on a success response means the content is unchanged and
//! the client keeps what it has.
//!
//! The envelope's `version` field is parsed before anything else and selects
//! the wire layout: version 2 carries a single legacy MD5 field, version 3
//! carries the full checksum list.

pub mod client;
pub mod error_code;
pub mod request;
pub mod response;
pub mod server;

use std::fmt;

use thiserror::Error;

use crate::compress::PayloadError;
use crate::trace::TraceError;

pub use client::ClientConfigRequest;
pub use error_code::{ErrorCode, SUCCESS};
pub use request::{ConfigRequestFields, RequestEnvelope, RequestValidationError};
pub use response::{ConfigResponse, DecodedResponse, ErrorResponse, OkResponse};
pub use server::ServerConfigRequest;

/// Upper bound on the JSON envelope section of a frame. Payload bytes are
/// bounded separately by [`crate::compress::MAX_UNCOMPRESSED_LEN`].
pub const MAX_ENVELOPE_LEN: u32 = 16 * 1024 * 1024;

/// Protocol versions this crate can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProtocolVersion {
    /// Legacy layout with a single `configMd5` baseline field.
    V2,
    /// Current layout with a typed checksum list.
    V3,
}

impl ProtocolVersion {
    /// The version new clients speak by default.
    pub const CURRENT: ProtocolVersion = ProtocolVersion::V3;

    /// The wire value of the `version` field.
    #[must_use]
    pub const fn number(self) -> u32 {
        match self {
            ProtocolVersion::V2 => 2,
            ProtocolVersion::V3 => 3,
        }
    }

    /// Maps a wire value to a version.
    #[must_use]
    pub fn from_number(number: u64) -> Option<ProtocolVersion> {
        match number {
            2 => Some(ProtocolVersion::V2),
            3 => Some(ProtocolVersion::V3),
            _ => None,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// Errors raised while encoding or decoding frames and envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The byte stream ended before the declared frame did.
    #[error("frame truncated: {0}")]
    Truncated(&'static str),
    /// The envelope length prefix exceeds [`MAX_ENVELOPE_LEN`].
    #[error("envelope length {0} exceeds limit {MAX_ENVELOPE_LEN}")]
    EnvelopeTooLarge(u32),
    /// The envelope bytes are not the expected JSON shape.
    #[error("envelope is not valid JSON: {0}")]
    Envelope(#[from] serde_json::Error),
    /// The envelope `version` field is absent.
    #[error("envelope has no version field")]
    MissingVersion,
    /// The envelope names a protocol version this crate does not speak.
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u64),
    /// A required envelope field is absent.
    #[error("envelope is missing field '{0}'")]
    MissingField(&'static str),
    /// A response does not belong to the request it was read against.
    #[error("response does not match request: {0}")]
    ResponseMismatch(&'static str),
    /// The embedded trace cannot be read.
    #[error(transparent)]
    Trace(#[from] TraceError),
    /// The payload section cannot be decoded.
    #[error(transparent)]
    Payload(#[from] PayloadError),
}

/// One wire frame: envelope bytes plus the payload section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// JSON envelope bytes.
    pub envelope: Vec<u8>,
    /// Raw payload bytes; empty for requests and unchanged responses.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Assembles a frame from its sections.
    #[must_use]
    pub fn new(envelope: Vec<u8>, payload: Vec<u8>) -> Self {
        Self { envelope, payload }
    }

    /// Encodes the frame to its byte form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let len = self.envelope.len() as u32;
        let mut out = Vec::with_capacity(4 + self.envelope.len() + self.payload.len());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.envelope);
        out.extend_from_slice(&self.payload);
        out
    }

    /// Decodes a frame from its byte form. Everything past the envelope is
    /// the payload section.
    ///
    /// # Errors
    ///
    /// Fails when the prefix or envelope is truncated, or the declared
    /// envelope length exceeds [`MAX_ENVELOPE_LEN`].
    pub fn decode(bytes: &[u8]) -> Result<Frame, ProtocolError> {
        let Some(prefix) = bytes.get(..4) else {
            return Err(ProtocolError::Truncated("length prefix"));
        };
        let len = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if len > MAX_ENVELOPE_LEN {
            return Err(ProtocolError::EnvelopeTooLarge(len));
        }
        let envelope_end = 4 + len as usize;
        let Some(envelope) = bytes.get(4..envelope_end) else {
            return Err(ProtocolError::Truncated("envelope"));
        };
        Ok(Frame {
            envelope: envelope.to_vec(),
            payload: bytes[envelope_end..].to_vec(),
        })
    }
}

/// Reads the `version` field of an envelope, before full parsing.
///
/// # Errors
///
/// Fails when the envelope is not JSON, the field is absent, or the value is
/// not a supported version.
pub fn peek_version(envelope: &[u8]) -> Result<ProtocolVersion, ProtocolError> {
    let value: serde_json::Value = serde_json::from_slice(envelope)?;
    let number = value
        .get("version")
        .ok_or(ProtocolError::MissingVersion)?
        .as_u64()
        .ok_or(ProtocolError::MissingVersion)?;
    ProtocolVersion::from_number(number).ok_or(ProtocolError::UnsupportedVersion(number))
}
