//! Numeric error codes carried by error responses.

use std::fmt;

/// The error-code value of a successful response.
pub const SUCCESS: u32 = 0;

/// Protocol-level failure kinds, each with a stable numeric code.
///
/// Codes starting at 100_001 identify validation failures of individual
/// request fields; the remainder are resolution failures. The numeric values
/// are part of the wire contract and must not be renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Definition name fails the identifier grammar.
    IllegalDefName,
    /// Namespace fails the identifier grammar.
    IllegalNamespace,
    /// Requesting hostname is empty.
    IllegalClientHost,
    /// Timeout budget is negative.
    IllegalTimeout,
    /// Baseline generation is negative.
    IllegalGeneration,
    /// A baseline checksum has the wrong length or alphabet for its type.
    IllegalChecksum,
    /// The version field names a protocol this server does not speak.
    IllegalProtocolVersion,
    /// The node version string does not parse.
    IllegalNodeVersion,
    /// The application has no config for the requested key.
    UnknownDefinition,
    /// The tenant/application is not yet resolvable on this server.
    ApplicationNotLoaded,
    /// The server's own view is older than the client's baseline.
    OutdatedConfig,
    /// A resolution failure wrapped into a well-formed response.
    InternalError,
}

impl ErrorCode {
    /// The wire value.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            ErrorCode::IllegalDefName => 100_001,
            ErrorCode::IllegalNamespace => 100_002,
            ErrorCode::IllegalClientHost => 100_003,
            ErrorCode::IllegalTimeout => 100_004,
            ErrorCode::IllegalGeneration => 100_005,
            ErrorCode::IllegalChecksum => 100_006,
            ErrorCode::IllegalProtocolVersion => 100_007,
            ErrorCode::IllegalNodeVersion => 100_008,
            ErrorCode::UnknownDefinition => 100_009,
            ErrorCode::ApplicationNotLoaded => 100_010,
            ErrorCode::OutdatedConfig => 100_011,
            ErrorCode::InternalError => 100_012,
        }
    }

    /// Maps a wire value back to its kind.
    #[must_use]
    pub fn from_code(code: u32) -> Option<ErrorCode> {
        const ALL: [ErrorCode; 12] = [
            ErrorCode::IllegalDefName,
            ErrorCode::IllegalNamespace,
            ErrorCode::IllegalClientHost,
            ErrorCode::IllegalTimeout,
            ErrorCode::IllegalGeneration,
            ErrorCode::IllegalChecksum,
            ErrorCode::IllegalProtocolVersion,
            ErrorCode::IllegalNodeVersion,
            ErrorCode::UnknownDefinition,
            ErrorCode::ApplicationNotLoaded,
            ErrorCode::OutdatedConfig,
            ErrorCode::InternalError,
        ];
        ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// True for failures the client should retry via its next long-poll
    /// round; validation failures are permanent until the request changes.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCode::ApplicationNotLoaded | ErrorCode::OutdatedConfig | ErrorCode::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::IllegalDefName => "ILLEGAL_DEF_NAME",
            ErrorCode::IllegalNamespace => "ILLEGAL_NAMESPACE",
            ErrorCode::IllegalClientHost => "ILLEGAL_CLIENT_HOST",
            ErrorCode::IllegalTimeout => "ILLEGAL_TIMEOUT",
            ErrorCode::IllegalGeneration => "ILLEGAL_GENERATION",
            ErrorCode::IllegalChecksum => "ILLEGAL_CHECKSUM",
            ErrorCode::IllegalProtocolVersion => "ILLEGAL_PROTOCOL_VERSION",
            ErrorCode::IllegalNodeVersion => "ILLEGAL_NODE_VERSION",
            ErrorCode::UnknownDefinition => "UNKNOWN_DEFINITION",
            ErrorCode::ApplicationNotLoaded => "APPLICATION_NOT_LOADED",
            ErrorCode::OutdatedConfig => "OUTDATED_CONFIG",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in [
            ErrorCode::IllegalDefName,
            ErrorCode::IllegalChecksum,
            ErrorCode::UnknownDefinition,
            ErrorCode::ApplicationNotLoaded,
            ErrorCode::OutdatedConfig,
            ErrorCode::InternalError,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), Some(code));
        }
    }

    #[test]
    fn unknown_code_maps_to_none() {
        assert_eq!(ErrorCode::from_code(0), None);
        assert_eq!(ErrorCode::from_code(99_999), None);
    }

    #[test]
    fn transient_classification() {
        assert!(ErrorCode::ApplicationNotLoaded.is_transient());
        assert!(ErrorCode::OutdatedConfig.is_transient());
        assert!(ErrorCode::InternalError.is_transient());
        assert!(!ErrorCode::IllegalDefName.is_transient());
        assert!(!ErrorCode::UnknownDefinition.is_transient());
    }

    #[test]
    fn display_matches_operator_vocabulary() {
        assert_eq!(
            ErrorCode::ApplicationNotLoaded.to_string(),
            "APPLICATION_NOT_LOADED"
        );
        assert_eq!(ErrorCode::OutdatedConfig.to_string(), "OUTDATED_CONFIG");
    }
}
