//! Response envelopes and their frame codec.
//!
//! A success response carries the resolved generation and digests in the
//! envelope; the payload bytes travel in the frame's payload section. An
//! empty payload section on success means the client's content is current
//! and it should keep what it has. Error responses carry a code and message
//! and never a payload.

use serde::{Deserialize, Serialize};

use crate::checksums::{ChecksumType, ConfigChecksum, PayloadChecksums};
use crate::compress::{CompressionInfo, Payload};
use crate::trace::Trace;
use crate::types::Generation;

use super::error_code::{ErrorCode, SUCCESS};
use super::request::RawChecksum;
use super::{peek_version, Frame, ProtocolError, ProtocolVersion};

/// A successful resolution: what the client should now hold.
#[derive(Debug, Clone, PartialEq)]
pub struct OkResponse {
    /// Generation of the resolved content.
    pub generation: Generation,
    /// Digests of the resolved content, echoing the request's digest types.
    pub checksums: PayloadChecksums,
    /// Resolved payload; `None` means unchanged, keep the current content.
    pub payload: Option<Payload>,
}

/// A failed resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Wire error code.
    pub code: u32,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorResponse {
    /// Builds an error response from a known code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// The known error kind, when the code maps to one.
    #[must_use]
    pub fn kind(&self) -> Option<ErrorCode> {
        ErrorCode::from_code(self.code)
    }
}

/// The outcome of one config request.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigResponse {
    /// Resolution succeeded.
    Ok(OkResponse),
    /// Resolution failed.
    Error(ErrorResponse),
}

/// A response frame taken apart.
#[derive(Debug, Clone)]
pub struct DecodedResponse {
    /// Wire layout the response used.
    pub protocol: ProtocolVersion,
    /// The decoded outcome.
    pub response: ConfigResponse,
    /// Server-side trace, when the request asked for one.
    pub trace: Option<Trace>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponseV3 {
    version: u32,
    error_code: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    error_message: String,
    #[serde(default)]
    generation: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    checksums: Vec<RawChecksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression_info: Option<CompressionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponseV2 {
    version: u32,
    error_code: u32,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    error_message: String,
    #[serde(default)]
    generation: u64,
    #[serde(default)]
    config_md5: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    compression_info: Option<CompressionInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<serde_json::Value>,
}

impl ConfigResponse {
    /// Whether this is a success outcome.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ConfigResponse::Ok(_))
    }

    /// The wire error code; [`SUCCESS`] for success outcomes.
    #[must_use]
    pub fn error_code(&self) -> u32 {
        match self {
            ConfigResponse::Ok(_) => SUCCESS,
            ConfigResponse::Error(err) => err.code,
        }
    }

    /// Encodes this outcome as a frame in the given wire layout.
    ///
    /// In the legacy layout only the MD5 digest can travel; other digest
    /// types are dropped at this point.
    ///
    /// # Errors
    ///
    /// Fails when JSON encoding fails.
    pub fn to_frame(
        &self,
        protocol: ProtocolVersion,
        trace: Option<&Trace>,
    ) -> Result<Frame, ProtocolError> {
        let trace = trace.map(Trace::to_wire);
        let (error_code, error_message, generation, checksums, payload) = match self {
            ConfigResponse::Ok(ok) => (
                SUCCESS,
                String::new(),
                ok.generation.value(),
                ok.checksums.clone(),
                ok.payload.clone(),
            ),
            ConfigResponse::Error(err) => (
                err.code,
                err.message.clone(),
                0,
                PayloadChecksums::empty(),
                None,
            ),
        };
        let compression_info = payload.as_ref().map(Payload::info);

        let envelope = match protocol {
            ProtocolVersion::V2 => serde_json::to_vec(&WireResponseV2 {
                version: protocol.number(),
                error_code,
                error_message,
                generation,
                config_md5: checksums
                    .get(ChecksumType::Md5)
                    .map(|c| c.value.clone())
                    .unwrap_or_default(),
                compression_info,
                trace,
            })?,
            ProtocolVersion::V3 => serde_json::to_vec(&WireResponseV3 {
                version: protocol.number(),
                error_code,
                error_message,
                generation,
                checksums: checksums
                    .iter()
                    .map(|c| RawChecksum {
                        kind: c.kind.to_string(),
                        value: c.value.clone(),
                    })
                    .collect(),
                compression_info,
                trace,
            })?,
        };

        let payload_bytes = payload.map(|p| p.data().to_vec()).unwrap_or_default();
        Ok(Frame::new(envelope, payload_bytes))
    }

    /// Decodes a response frame, dispatching on the version field.
    ///
    /// # Errors
    ///
    /// Fails when the envelope is malformed, the version is unsupported, or
    /// an embedded trace does not parse.
    pub fn from_frame(frame: &Frame) -> Result<DecodedResponse, ProtocolError> {
        let protocol = peek_version(&frame.envelope)?;
        let (error_code, error_message, generation, checksums, compression_info, trace) =
            match protocol {
                ProtocolVersion::V2 => {
                    let wire: WireResponseV2 = serde_json::from_slice(&frame.envelope)?;
                    let mut checksums = PayloadChecksums::empty();
                    if !wire.config_md5.is_empty() {
                        checksums.insert(ConfigChecksum::new(ChecksumType::Md5, wire.config_md5));
                    }
                    (
                        wire.error_code,
                        wire.error_message,
                        wire.generation,
                        checksums,
                        wire.compression_info,
                        wire.trace,
                    )
                }
                ProtocolVersion::V3 => {
                    let wire: WireResponseV3 = serde_json::from_slice(&frame.envelope)?;
                    let checksums = wire
                        .checksums
                        .iter()
                        .filter_map(|raw| {
                            ChecksumType::from_name(&raw.kind)
                                .map(|kind| ConfigChecksum::new(kind, raw.value.clone()))
                        })
                        .collect();
                    (
                        wire.error_code,
                        wire.error_message,
                        wire.generation,
                        checksums,
                        wire.compression_info,
                        wire.trace,
                    )
                }
            };

        let trace = trace.as_ref().map(Trace::from_wire).transpose()?;

        let response = if error_code == SUCCESS {
            let payload = if frame.payload.is_empty() {
                None
            } else {
                let info = compression_info
                    .unwrap_or_else(|| CompressionInfo::uncompressed(frame.payload.len() as u64));
                Some(Payload::from_wire(frame.payload.clone(), info))
            };
            ConfigResponse::Ok(OkResponse {
                generation: Generation(generation),
                checksums,
                payload,
            })
        } else {
            ConfigResponse::Error(ErrorResponse {
                code: error_code,
                message: error_message,
            })
        };

        Ok(DecodedResponse {
            protocol,
            response,
            trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressionType;
    use crate::payload::ConfigPayload;

    fn sample_payload() -> ConfigPayload {
        ConfigPayload::from_json_str(r#"{"myfield":"bar"}"#).unwrap()
    }

    // ---- success responses ----

    #[test]
    fn ok_with_payload_round_trips() {
        let config = sample_payload();
        let payload = Payload::from_config_compressed(&config, CompressionType::Lz4);
        let response = ConfigResponse::Ok(OkResponse {
            generation: Generation(4),
            checksums: PayloadChecksums::compute_full(&config.canonical_bytes()),
            payload: Some(payload.clone()),
        });

        let frame = response.to_frame(ProtocolVersion::V3, None).unwrap();
        assert!(!frame.payload.is_empty());

        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        assert_eq!(decoded.protocol, ProtocolVersion::V3);
        let ConfigResponse::Ok(ok) = decoded.response else {
            panic!("expected success");
        };
        assert_eq!(ok.generation, Generation(4));
        assert_eq!(ok.payload.unwrap().to_config().unwrap(), config);
    }

    #[test]
    fn ok_without_payload_means_unchanged() {
        let checksums = PayloadChecksums::compute_full(b"{\"myfield\":\"bar\"}");
        let response = ConfigResponse::Ok(OkResponse {
            generation: Generation(7),
            checksums: checksums.clone(),
            payload: None,
        });

        let frame = response.to_frame(ProtocolVersion::V3, None).unwrap();
        assert!(frame.payload.is_empty());

        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        let ConfigResponse::Ok(ok) = decoded.response else {
            panic!("expected success");
        };
        assert!(ok.payload.is_none());
        assert_eq!(ok.checksums, checksums);
        assert_eq!(ok.generation, Generation(7));
    }

    #[test]
    fn missing_compression_info_defaults_to_uncompressed() {
        let config = sample_payload();
        let payload = Payload::from_config(&config);
        let response = ConfigResponse::Ok(OkResponse {
            generation: Generation(1),
            checksums: PayloadChecksums::empty(),
            payload: Some(payload),
        });
        let mut frame = response.to_frame(ProtocolVersion::V3, None).unwrap();

        // Strip the optional compressionInfo from the envelope.
        let mut envelope: serde_json::Value = serde_json::from_slice(&frame.envelope).unwrap();
        envelope.as_object_mut().unwrap().remove("compressionInfo");
        frame.envelope = serde_json::to_vec(&envelope).unwrap();

        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        let ConfigResponse::Ok(ok) = decoded.response else {
            panic!("expected success");
        };
        assert_eq!(ok.payload.unwrap().to_config().unwrap(), config);
    }

    // ---- error responses ----

    #[test]
    fn error_round_trips_with_kind() {
        let response = ConfigResponse::Error(ErrorResponse::new(
            ErrorCode::ApplicationNotLoaded,
            "host node1 is not owned by a loaded application",
        ));
        let frame = response.to_frame(ProtocolVersion::V3, None).unwrap();
        assert!(frame.payload.is_empty());

        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        let ConfigResponse::Error(err) = decoded.response else {
            panic!("expected error");
        };
        assert_eq!(err.kind(), Some(ErrorCode::ApplicationNotLoaded));
        assert!(err.message.contains("node1"));
    }

    #[test]
    fn unknown_error_code_has_no_kind() {
        let err = ErrorResponse {
            code: 999,
            message: "??".to_string(),
        };
        assert!(err.kind().is_none());
    }

    // ---- legacy layout ----

    #[test]
    fn v2_carries_only_the_md5() {
        let config = sample_payload();
        let response = ConfigResponse::Ok(OkResponse {
            generation: Generation(2),
            checksums: PayloadChecksums::compute_full(&config.canonical_bytes()),
            payload: Some(Payload::from_config(&config)),
        });
        let frame = response.to_frame(ProtocolVersion::V2, None).unwrap();

        let envelope: serde_json::Value = serde_json::from_slice(&frame.envelope).unwrap();
        assert_eq!(envelope["version"], 2);
        assert!(envelope.get("checksums").is_none());
        assert!(envelope["configMd5"].as_str().unwrap().len() == 32);

        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        let ConfigResponse::Ok(ok) = decoded.response else {
            panic!("expected success");
        };
        assert!(ok.checksums.get(ChecksumType::Md5).is_some());
        assert!(ok.checksums.get(ChecksumType::XxHash64).is_none());
    }

    // ---- traces ----

    #[test]
    fn trace_round_trips_in_the_envelope() {
        let mut trace = Trace::new(3);
        trace.trace(1, "resolved from cache");
        let response = ConfigResponse::Ok(OkResponse {
            generation: Generation(1),
            checksums: PayloadChecksums::empty(),
            payload: None,
        });
        let frame = response.to_frame(ProtocolVersion::V3, Some(&trace)).unwrap();
        let decoded = ConfigResponse::from_frame(&frame).unwrap();
        let restored = decoded.trace.unwrap();
        assert_eq!(restored.level_cap(), 3);
        assert_eq!(restored.node_count(), 1);
    }
}
