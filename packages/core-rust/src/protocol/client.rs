//! Client-side view of one config request.
//!
//! A [`ClientConfigRequest`] is built for a key, sent as a frame, and fed the
//! response frame back. It then answers whether the content or generation
//! moved, and [`ClientConfigRequest::next_request`] derives the follow-up
//! request: successful responses become the new baseline, errors leave the
//! baseline untouched so a retry asks for the same thing again.

use crate::checksums::{ChecksumState, ChecksumType, PayloadChecksums};
use crate::compress::{CompressionType, Payload};
use crate::def::DefContent;
use crate::key::ConfigKey;
use crate::trace::Trace;
use crate::types::{Generation, NodeVersion};

use super::request::{ConfigRequestFields, RequestEnvelope, RequestValidationError};
use super::response::{ConfigResponse, DecodedResponse};
use super::{Frame, ProtocolError, ProtocolVersion};

/// One long-poll request as the client sees it.
#[derive(Debug, Clone)]
pub struct ClientConfigRequest {
    fields: ConfigRequestFields,
    protocol: ProtocolVersion,
    trace_level: u32,
    outcome: Option<DecodedResponse>,
}

impl ClientConfigRequest {
    /// Starts a request for `key` from `client_hostname` with an empty
    /// baseline, asking in the current wire layout.
    #[must_use]
    pub fn new(key: ConfigKey, client_hostname: impl Into<String>) -> Self {
        Self {
            fields: ConfigRequestFields {
                key,
                def_content: DefContent::empty(),
                client_hostname: client_hostname.into(),
                node_version: None,
                compression: CompressionType::None,
                checksums: PayloadChecksums::empty(),
                generation: Generation::ZERO,
                timeout_ms: 0,
            },
            protocol: ProtocolVersion::CURRENT,
            trace_level: 0,
            outcome: None,
        }
    }

    /// Sends the schema the client compiled against.
    #[must_use]
    pub fn with_def_content(mut self, def_content: DefContent) -> Self {
        self.fields.def_content = def_content;
        self
    }

    /// Reports the client's software version.
    #[must_use]
    pub fn with_node_version(mut self, version: NodeVersion) -> Self {
        self.fields.node_version = Some(version);
        self
    }

    /// Asks for the response payload in the given compression.
    #[must_use]
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.fields.compression = compression;
        self
    }

    /// Sets the baseline the server diffs against.
    #[must_use]
    pub fn with_baseline(mut self, generation: Generation, checksums: PayloadChecksums) -> Self {
        self.fields.generation = generation;
        self.fields.checksums = checksums;
        self
    }

    /// Sets the long-poll budget.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.fields.timeout_ms = timeout_ms;
        self
    }

    /// Speaks an explicit wire layout instead of the current one.
    #[must_use]
    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    /// Asks the server to trace its resolution at up to this level.
    #[must_use]
    pub fn with_trace_level(mut self, level: u32) -> Self {
        self.trace_level = level;
        self
    }

    /// The request's field set.
    #[must_use]
    pub fn fields(&self) -> &ConfigRequestFields {
        &self.fields
    }

    /// Wire layout this request speaks.
    #[must_use]
    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Checks the request parameters the same way the server will.
    ///
    /// # Errors
    ///
    /// Returns the error code and detail of the offending field.
    pub fn validate_parameters(&self) -> Result<(), RequestValidationError> {
        RequestEnvelope::from_fields(&self.fields, self.protocol, None).validate()
    }

    /// Encodes the request as a frame. The payload section of a request
    /// frame is always empty.
    ///
    /// # Errors
    ///
    /// Fails when JSON encoding fails.
    pub fn to_frame(&self) -> Result<Frame, ProtocolError> {
        let trace = (self.trace_level > 0).then(|| Trace::new(self.trace_level));
        let envelope = RequestEnvelope::from_fields(&self.fields, self.protocol, trace.as_ref());
        Ok(Frame::new(envelope.encode()?, Vec::new()))
    }

    /// Decodes and validates the response frame, storing the outcome.
    ///
    /// A success response must answer in the request's wire layout, must not
    /// move the generation backwards, and must echo the request's digest
    /// types. Error responses are stored as-is.
    ///
    /// # Errors
    ///
    /// Fails when the frame is malformed or violates those rules; the
    /// outcome is left empty in that case.
    pub fn read_response(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let decoded = ConfigResponse::from_frame(frame)?;
        if decoded.protocol != self.protocol {
            return Err(ProtocolError::ResponseMismatch(
                "response uses a different protocol version",
            ));
        }
        if let ConfigResponse::Ok(ok) = &decoded.response {
            if ok.generation < self.fields.generation {
                return Err(ProtocolError::ResponseMismatch(
                    "response generation is older than the request baseline",
                ));
            }
            if !self.echo_policy_holds(&ok.checksums) {
                return Err(ProtocolError::ResponseMismatch(
                    "response checksums do not echo the request's digest types",
                ));
            }
        }
        self.outcome = Some(decoded);
        Ok(())
    }

    fn echo_policy_holds(&self, response: &PayloadChecksums) -> bool {
        if self.protocol == ProtocolVersion::V2 {
            return response.get(ChecksumType::Md5).is_some()
                && response.get(ChecksumType::XxHash64).is_none();
        }
        match self.fields.checksums.state() {
            ChecksumState::Empty => response.state() == ChecksumState::Full,
            ChecksumState::Partial | ChecksumState::Full => {
                response.same_types(&self.fields.checksums)
            }
        }
    }

    // ---- outcome inspection ----

    /// Whether the response carries content whose digests differ from the
    /// request baseline.
    #[must_use]
    pub fn has_updated_config(&self) -> bool {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Ok(ok),
                ..
            }) => !self.fields.checksums.matches(&ok.checksums),
            _ => false,
        }
    }

    /// Whether the response moved the generation past the request baseline.
    #[must_use]
    pub fn has_updated_generation(&self) -> bool {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Ok(ok),
                ..
            }) => ok.generation > self.fields.generation,
            _ => false,
        }
    }

    /// The error code of a failed response.
    #[must_use]
    pub fn error_code(&self) -> Option<u32> {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Error(err),
                ..
            }) => Some(err.code),
            _ => None,
        }
    }

    /// The error message of a failed response.
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Error(err),
                ..
            }) => Some(err.message.as_str()),
            _ => None,
        }
    }

    /// The generation a successful response resolved to.
    #[must_use]
    pub fn response_generation(&self) -> Option<Generation> {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Ok(ok),
                ..
            }) => Some(ok.generation),
            _ => None,
        }
    }

    /// The digests a successful response resolved to.
    #[must_use]
    pub fn response_checksums(&self) -> Option<&PayloadChecksums> {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Ok(ok),
                ..
            }) => Some(&ok.checksums),
            _ => None,
        }
    }

    /// The payload of a successful response; `None` also when the response
    /// said the content is unchanged.
    #[must_use]
    pub fn response_payload(&self) -> Option<&Payload> {
        match &self.outcome {
            Some(DecodedResponse {
                response: ConfigResponse::Ok(ok),
                ..
            }) => ok.payload.as_ref(),
            _ => None,
        }
    }

    /// The server's trace, when the response carried one.
    #[must_use]
    pub fn response_trace(&self) -> Option<&Trace> {
        self.outcome.as_ref().and_then(|d| d.trace.as_ref())
    }

    /// Derives the follow-up long poll. A successful response becomes the
    /// new baseline; an error, or no response at all, leaves the baseline
    /// exactly as it was.
    #[must_use]
    pub fn next_request(&self) -> ClientConfigRequest {
        let mut fields = self.fields.clone();
        if let Some(DecodedResponse {
            response: ConfigResponse::Ok(ok),
            ..
        }) = &self.outcome
        {
            fields.generation = ok.generation;
            fields.checksums = ok.checksums.clone();
        }
        ClientConfigRequest {
            fields,
            protocol: self.protocol,
            trace_level: self.trace_level,
            outcome: None,
        }
    }
}
