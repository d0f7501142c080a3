//! Request envelopes and their validation.
//!
//! A request travels as a JSON envelope (the frame's payload section stays
//! empty). Parsing is permissive: absent fields default so that a malformed
//! request still parses far enough to be answered with a specific error code
//! from [`RequestEnvelope::validate`] instead of a bare transport failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checksums::{ChecksumType, ConfigChecksum, PayloadChecksums};
use crate::compress::CompressionType;
use crate::def::DefContent;
use crate::key::ConfigKey;
use crate::trace::{Trace, TraceError};
use crate::types::{Generation, NodeVersion};

use super::error_code::ErrorCode;
use super::{peek_version, ProtocolError, ProtocolVersion};

/// A request field failed validation; carries the wire code to answer with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct RequestValidationError {
    /// Error code identifying the offending field.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl RequestValidationError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The typed, validated field set shared by client and server requests.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigRequestFields {
    /// The watched resource.
    pub key: ConfigKey,
    /// Schema the client compiled against.
    pub def_content: DefContent,
    /// Requesting host.
    pub client_hostname: String,
    /// Software version of the requesting node.
    pub node_version: Option<NodeVersion>,
    /// Compression the client wants the response payload in.
    pub compression: CompressionType,
    /// Digests of the config the client currently holds.
    pub checksums: PayloadChecksums,
    /// Generation the client currently holds.
    pub generation: Generation,
    /// Long-poll budget in milliseconds.
    pub timeout_ms: u64,
}

/// One baseline digest as transmitted, with the algorithm still a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChecksum {
    /// Algorithm name, e.g. `md5`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Hex digest value.
    pub value: String,
}

/// A request as read off the wire, before validation.
///
/// Fields are held as transmitted. [`RequestEnvelope::validate`] checks them
/// against the parameter rules and [`RequestEnvelope::to_fields`] converts to
/// the typed form.
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Wire layout this envelope uses.
    pub protocol: ProtocolVersion,
    /// Definition name.
    pub def_name: String,
    /// Definition namespace.
    pub def_namespace: String,
    /// Schema lines, when the client sends its schema along.
    pub def_content: Vec<String>,
    /// Digest of the client's schema.
    pub def_digest: String,
    /// Instance id.
    pub config_id: String,
    /// Requesting host.
    pub client_hostname: String,
    /// Software version string of the requesting node.
    pub node_version: Option<String>,
    /// Baseline generation as transmitted; negative values fail validation.
    pub current_generation: i64,
    /// Timeout budget as transmitted; negative values fail validation.
    pub timeout_ms: i64,
    /// Requested response compression.
    pub compression: CompressionType,
    /// Baseline digests (current layout).
    pub checksums: Vec<RawChecksum>,
    /// Baseline MD5 (legacy layout); empty means no baseline.
    pub legacy_md5: Option<String>,
    /// Serialized trace, passed through verbatim until someone reads it.
    pub trace: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequestV3 {
    version: u32,
    #[serde(default)]
    def_name: String,
    #[serde(default)]
    def_namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    def_content: Vec<String>,
    #[serde(default)]
    def_digest: String,
    #[serde(default)]
    config_id: String,
    #[serde(default)]
    client_hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_version: Option<String>,
    #[serde(default)]
    current_generation: i64,
    #[serde(default)]
    timeout_ms: i64,
    #[serde(default)]
    compression_type: CompressionType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    checksums: Vec<RawChecksum>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRequestV2 {
    version: u32,
    #[serde(default)]
    def_name: String,
    #[serde(default)]
    def_namespace: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    def_content: Vec<String>,
    #[serde(default)]
    def_digest: String,
    #[serde(default)]
    config_id: String,
    #[serde(default)]
    client_hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_version: Option<String>,
    #[serde(default)]
    current_generation: i64,
    #[serde(default)]
    timeout_ms: i64,
    #[serde(default)]
    compression_type: CompressionType,
    #[serde(default)]
    config_md5: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trace: Option<serde_json::Value>,
}

impl RequestEnvelope {
    /// Parses envelope bytes, dispatching on the version field.
    ///
    /// # Errors
    ///
    /// Fails when the bytes are not JSON, the version is absent or
    /// unsupported, or a present field has the wrong JSON type.
    pub fn parse(envelope: &[u8]) -> Result<RequestEnvelope, ProtocolError> {
        match peek_version(envelope)? {
            ProtocolVersion::V2 => {
                let wire: WireRequestV2 = serde_json::from_slice(envelope)?;
                Ok(RequestEnvelope {
                    protocol: ProtocolVersion::V2,
                    def_name: wire.def_name,
                    def_namespace: wire.def_namespace,
                    def_content: wire.def_content,
                    def_digest: wire.def_digest,
                    config_id: wire.config_id,
                    client_hostname: wire.client_hostname,
                    node_version: wire.node_version,
                    current_generation: wire.current_generation,
                    timeout_ms: wire.timeout_ms,
                    compression: wire.compression_type,
                    checksums: Vec::new(),
                    legacy_md5: Some(wire.config_md5),
                    trace: wire.trace,
                })
            }
            ProtocolVersion::V3 => {
                let wire: WireRequestV3 = serde_json::from_slice(envelope)?;
                Ok(RequestEnvelope {
                    protocol: ProtocolVersion::V3,
                    def_name: wire.def_name,
                    def_namespace: wire.def_namespace,
                    def_content: wire.def_content,
                    def_digest: wire.def_digest,
                    config_id: wire.config_id,
                    client_hostname: wire.client_hostname,
                    node_version: wire.node_version,
                    current_generation: wire.current_generation,
                    timeout_ms: wire.timeout_ms,
                    compression: wire.compression_type,
                    checksums: wire.checksums,
                    legacy_md5: None,
                    trace: wire.trace,
                })
            }
        }
    }

    /// Builds an envelope from validated fields, for sending.
    #[must_use]
    pub fn from_fields(
        fields: &ConfigRequestFields,
        protocol: ProtocolVersion,
        trace: Option<&Trace>,
    ) -> RequestEnvelope {
        let (checksums, legacy_md5) = match protocol {
            ProtocolVersion::V3 => (
                fields
                    .checksums
                    .iter()
                    .map(|c| RawChecksum {
                        kind: c.kind.to_string(),
                        value: c.value.clone(),
                    })
                    .collect(),
                None,
            ),
            ProtocolVersion::V2 => (
                Vec::new(),
                Some(
                    fields
                        .checksums
                        .get(ChecksumType::Md5)
                        .map(|c| c.value.clone())
                        .unwrap_or_default(),
                ),
            ),
        };
        RequestEnvelope {
            protocol,
            def_name: fields.key.name.clone(),
            def_namespace: fields.key.namespace.clone(),
            def_content: fields.def_content.lines().to_vec(),
            def_digest: fields.def_content.digest().to_string(),
            config_id: fields.key.config_id.clone(),
            client_hostname: fields.client_hostname.clone(),
            node_version: fields.node_version.map(|v| v.to_string()),
            current_generation: fields.generation.value() as i64,
            timeout_ms: fields.timeout_ms as i64,
            compression: fields.compression,
            checksums,
            legacy_md5,
            trace: trace.map(Trace::to_wire),
        }
    }

    /// Serializes to envelope bytes in this envelope's wire layout.
    ///
    /// # Errors
    ///
    /// Fails when JSON encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let bytes = match self.protocol {
            ProtocolVersion::V2 => serde_json::to_vec(&WireRequestV2 {
                version: self.protocol.number(),
                def_name: self.def_name.clone(),
                def_namespace: self.def_namespace.clone(),
                def_content: self.def_content.clone(),
                def_digest: self.def_digest.clone(),
                config_id: self.config_id.clone(),
                client_hostname: self.client_hostname.clone(),
                node_version: self.node_version.clone(),
                current_generation: self.current_generation,
                timeout_ms: self.timeout_ms,
                compression_type: self.compression,
                config_md5: self.legacy_md5.clone().unwrap_or_default(),
                trace: self.trace.clone(),
            })?,
            ProtocolVersion::V3 => serde_json::to_vec(&WireRequestV3 {
                version: self.protocol.number(),
                def_name: self.def_name.clone(),
                def_namespace: self.def_namespace.clone(),
                def_content: self.def_content.clone(),
                def_digest: self.def_digest.clone(),
                config_id: self.config_id.clone(),
                client_hostname: self.client_hostname.clone(),
                node_version: self.node_version.clone(),
                current_generation: self.current_generation,
                timeout_ms: self.timeout_ms,
                compression_type: self.compression,
                checksums: self.checksums.clone(),
                trace: self.trace.clone(),
            })?,
        };
        Ok(bytes)
    }

    /// Checks every parameter rule, reporting the first violation.
    ///
    /// # Errors
    ///
    /// Returns the error code and detail of the offending field.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        if !ConfigKey::is_valid_name(&self.def_name) {
            return Err(RequestValidationError::new(
                ErrorCode::IllegalDefName,
                format!("invalid definition name '{}'", self.def_name),
            ));
        }
        if !ConfigKey::is_valid_namespace(&self.def_namespace) {
            return Err(RequestValidationError::new(
                ErrorCode::IllegalNamespace,
                format!("invalid namespace '{}'", self.def_namespace),
            ));
        }
        if self.client_hostname.is_empty() {
            return Err(RequestValidationError::new(
                ErrorCode::IllegalClientHost,
                "client hostname is empty",
            ));
        }
        if self.current_generation < 0 {
            return Err(RequestValidationError::new(
                ErrorCode::IllegalGeneration,
                format!("negative generation {}", self.current_generation),
            ));
        }
        if self.timeout_ms < 0 {
            return Err(RequestValidationError::new(
                ErrorCode::IllegalTimeout,
                format!("negative timeout {}", self.timeout_ms),
            ));
        }
        for raw in &self.checksums {
            let Some(kind) = ChecksumType::from_name(&raw.kind) else {
                return Err(RequestValidationError::new(
                    ErrorCode::IllegalChecksum,
                    format!("unknown checksum type '{}'", raw.kind),
                ));
            };
            let checksum = ConfigChecksum::new(kind, raw.value.clone());
            if !checksum.has_valid_format() {
                return Err(RequestValidationError::new(
                    ErrorCode::IllegalChecksum,
                    format!("invalid {kind} checksum '{}'", raw.value),
                ));
            }
        }
        if let Some(md5) = &self.legacy_md5 {
            if !md5.is_empty() {
                let checksum = ConfigChecksum::new(ChecksumType::Md5, md5.clone());
                if !checksum.has_valid_format() {
                    return Err(RequestValidationError::new(
                        ErrorCode::IllegalChecksum,
                        format!("invalid md5 checksum '{md5}'"),
                    ));
                }
            }
        }
        if let Some(raw) = &self.node_version {
            if raw.parse::<NodeVersion>().is_err() {
                return Err(RequestValidationError::new(
                    ErrorCode::IllegalNodeVersion,
                    format!("invalid node version '{raw}'"),
                ));
            }
        }
        Ok(())
    }

    /// Validates and converts to the typed field set.
    ///
    /// # Errors
    ///
    /// Fails with the same errors as [`RequestEnvelope::validate`].
    pub fn to_fields(&self) -> Result<ConfigRequestFields, RequestValidationError> {
        self.validate()?;

        let def_content = if self.def_content.is_empty() {
            if self.def_digest.is_empty() {
                DefContent::empty()
            } else {
                DefContent::digest_only(self.def_digest.clone())
            }
        } else {
            DefContent::from_lines(self.def_content.clone())
        };

        Ok(ConfigRequestFields {
            key: ConfigKey::new(
                self.def_name.clone(),
                self.def_namespace.clone(),
                self.config_id.clone(),
            ),
            def_content,
            client_hostname: self.client_hostname.clone(),
            node_version: self
                .node_version
                .as_deref()
                .map(|raw| raw.parse().expect("node version was validated")),
            compression: self.compression,
            checksums: self.baseline_checksums(),
            generation: Generation(self.current_generation.max(0) as u64),
            timeout_ms: self.timeout_ms.max(0) as u64,
        })
    }

    /// The baseline digests in typed form, dropping entries that do not
    /// parse. Use after [`RequestEnvelope::validate`] for exact semantics.
    #[must_use]
    pub fn baseline_checksums(&self) -> PayloadChecksums {
        if let Some(md5) = &self.legacy_md5 {
            if md5.is_empty() {
                return PayloadChecksums::empty();
            }
            let mut checksums = PayloadChecksums::empty();
            checksums.insert(ConfigChecksum::new(ChecksumType::Md5, md5.clone()));
            return checksums;
        }
        self.checksums
            .iter()
            .filter_map(|raw| {
                ChecksumType::from_name(&raw.kind)
                    .map(|kind| ConfigChecksum::new(kind, raw.value.clone()))
            })
            .collect()
    }

    /// Reads the embedded trace, when one was sent.
    ///
    /// # Errors
    ///
    /// Fails when the trace value is malformed.
    pub fn read_trace(&self) -> Result<Option<Trace>, TraceError> {
        self.trace.as_ref().map(Trace::from_wire).transpose()
    }
}
