//! Server-side view of one config request.
//!
//! A [`ServerConfigRequest`] is shared between the connection handler and the
//! delayed-response registry, so its mutable pieces are a one-shot delay
//! latch, a write-once response slot, and a mutex-guarded trace. Whichever
//! path resolves the request first wins; later attempts are dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::{Mutex, MutexGuard};

use crate::checksums::{ChecksumState, ChecksumType, ConfigChecksum, PayloadChecksums};
use crate::compress::{CompressionType, Payload};
use crate::key::ConfigKey;
use crate::trace::Trace;
use crate::types::{Generation, NodeVersion};

use super::error_code::ErrorCode;
use super::request::{RequestEnvelope, RequestValidationError};
use super::response::{ConfigResponse, ErrorResponse, OkResponse};
use super::{Frame, ProtocolError, ProtocolVersion};

/// One in-flight request on the server.
#[derive(Debug)]
pub struct ServerConfigRequest {
    envelope: RequestEnvelope,
    trace: Mutex<Trace>,
    delayed: AtomicBool,
    response: OnceLock<ConfigResponse>,
}

impl ServerConfigRequest {
    /// Wraps a parsed envelope, materializing its trace.
    ///
    /// # Errors
    ///
    /// Fails when the embedded trace is malformed.
    pub fn from_envelope(envelope: RequestEnvelope) -> Result<ServerConfigRequest, ProtocolError> {
        let trace = envelope.read_trace()?.unwrap_or_else(|| Trace::new(0));
        Ok(ServerConfigRequest {
            envelope,
            trace: Mutex::new(trace),
            delayed: AtomicBool::new(false),
            response: OnceLock::new(),
        })
    }

    /// Parses a request frame into a server request.
    ///
    /// # Errors
    ///
    /// Fails when the envelope does not parse or its trace is malformed.
    pub fn from_frame(frame: &Frame) -> Result<ServerConfigRequest, ProtocolError> {
        Self::from_envelope(RequestEnvelope::parse(&frame.envelope)?)
    }

    /// Checks every request parameter, reporting the first violation.
    ///
    /// # Errors
    ///
    /// Returns the error code and detail of the offending field.
    pub fn validate_parameters(&self) -> Result<(), RequestValidationError> {
        self.envelope.validate()
    }

    // ---- accessors ----

    /// The watched resource.
    #[must_use]
    pub fn key(&self) -> ConfigKey {
        ConfigKey::new(
            self.envelope.def_name.clone(),
            self.envelope.def_namespace.clone(),
            self.envelope.config_id.clone(),
        )
    }

    /// Host the request came from.
    #[must_use]
    pub fn client_hostname(&self) -> &str {
        &self.envelope.client_hostname
    }

    /// Wire layout the request used; the response answers in kind.
    #[must_use]
    pub fn protocol(&self) -> ProtocolVersion {
        self.envelope.protocol
    }

    /// Compression the client asked the response payload to use.
    #[must_use]
    pub fn compression(&self) -> CompressionType {
        self.envelope.compression
    }

    /// Generation the client currently holds.
    #[must_use]
    pub fn baseline_generation(&self) -> Generation {
        Generation(self.envelope.current_generation.max(0) as u64)
    }

    /// Digests of the content the client currently holds.
    #[must_use]
    pub fn baseline_checksums(&self) -> PayloadChecksums {
        self.envelope.baseline_checksums()
    }

    /// Long-poll budget in milliseconds.
    #[must_use]
    pub fn timeout_ms(&self) -> u64 {
        self.envelope.timeout_ms.max(0) as u64
    }

    /// Digest of the schema the client compiled against.
    #[must_use]
    pub fn def_digest(&self) -> &str {
        &self.envelope.def_digest
    }

    /// Schema lines, when the client sent them along.
    #[must_use]
    pub fn def_content_lines(&self) -> &[String] {
        &self.envelope.def_content
    }

    /// Software version of the requesting node, when sent and parseable.
    #[must_use]
    pub fn node_version(&self) -> Option<NodeVersion> {
        self.envelope
            .node_version
            .as_deref()
            .and_then(|raw| raw.parse().ok())
    }

    /// The request's trace; hold the guard only briefly.
    pub fn trace(&self) -> MutexGuard<'_, Trace> {
        self.trace.lock()
    }

    // ---- delay latch ----

    /// Whether this request has been parked in the delayed-response registry.
    #[must_use]
    pub fn is_delayed_response(&self) -> bool {
        self.delayed.load(Ordering::Acquire)
    }

    /// Marks the request delayed. Returns `true` only for the first caller,
    /// so enqueueing the same request twice is impossible.
    pub fn set_delayed_response(&self) -> bool {
        self.delayed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // ---- response slot ----

    /// Digests for a response whose canonical content is `canonical`,
    /// echoing the request's digest types: an empty baseline gets the full
    /// set, anything else gets exactly the types it sent. Legacy requests
    /// always get MD5 only.
    #[must_use]
    pub fn response_checksums(&self, canonical: &[u8]) -> PayloadChecksums {
        if self.envelope.protocol == ProtocolVersion::V2 {
            return std::iter::once(ConfigChecksum::compute(ChecksumType::Md5, canonical))
                .collect();
        }
        let baseline = self.baseline_checksums();
        match baseline.state() {
            ChecksumState::Empty => PayloadChecksums::compute_full(canonical),
            ChecksumState::Partial | ChecksumState::Full => baseline.compute_matching(canonical),
        }
    }

    /// Resolves the request successfully. `payload` of `None` means the
    /// client's content is unchanged. Returns `true` when this call won the
    /// resolution; a lost race leaves the earlier outcome in place.
    pub fn add_ok_response(
        &self,
        generation: Generation,
        canonical: &[u8],
        payload: Option<Payload>,
    ) -> bool {
        self.set_response(ConfigResponse::Ok(OkResponse {
            generation,
            checksums: self.response_checksums(canonical),
            payload,
        }))
    }

    /// Resolves the request with an error. Returns `true` when this call won
    /// the resolution.
    pub fn add_error_response(&self, code: ErrorCode, message: impl Into<String>) -> bool {
        self.set_response(ConfigResponse::Error(ErrorResponse::new(
            code,
            message.into(),
        )))
    }

    fn set_response(&self, response: ConfigResponse) -> bool {
        let won = self.response.set(response).is_ok();
        if !won {
            tracing::debug!(key = %self.key(), "request already resolved, dropping late response");
        }
        won
    }

    /// The resolved outcome, once one exists.
    #[must_use]
    pub fn response(&self) -> Option<&ConfigResponse> {
        self.response.get()
    }

    /// Encodes the resolved outcome as a response frame in the request's
    /// wire layout, carrying the trace when one was asked for.
    ///
    /// # Errors
    ///
    /// Fails when the request has not been resolved or encoding fails.
    pub fn to_response_frame(&self) -> Result<Frame, ProtocolError> {
        let response = self
            .response
            .get()
            .ok_or(ProtocolError::ResponseMismatch("request is not resolved"))?;
        let trace = self.trace.lock();
        let include_trace = trace.level_cap() > 0 || !trace.is_empty();
        response.to_frame(self.envelope.protocol, include_trace.then_some(&*trace))
    }
}

impl fmt::Display for ServerConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} from {} gen {} timeout {}ms",
            self.key(),
            self.envelope.client_hostname,
            self.baseline_generation(),
            self.timeout_ms(),
        )
    }
}
