//! Confab Core — config keys, payloads, checksums, traces, and the wire protocol.

pub mod checksums;
pub mod clock;
pub mod compress;
pub mod def;
pub mod key;
pub mod payload;
pub mod protocol;
pub mod trace;
pub mod types;

pub use checksums::{ChecksumState, ChecksumType, ConfigChecksum, PayloadChecksums};
pub use clock::{ClockSource, SystemClock};
pub use compress::{CompressionInfo, CompressionType, Payload, PayloadError};
pub use def::DefContent;
pub use key::ConfigKey;
pub use payload::{ConfigPayload, ConfigValue};
pub use protocol::{
    ClientConfigRequest, ConfigResponse, ErrorCode, Frame, ProtocolError, ProtocolVersion,
    ServerConfigRequest,
};
pub use trace::{Trace, TraceNode, TracePayload};
pub use types::{ApplicationId, Generation, NodeVersion};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
