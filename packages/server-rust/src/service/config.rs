/// Server-level configuration for the request pipeline.
///
/// Controls the long-poll timeout ceiling and the background sweep cadence.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Upper bound on how long a request may stay parked, in milliseconds.
    /// Client timeouts above this are clamped down to it.
    pub max_timeout_ms: u64,
    /// Interval between expiry sweeps over the parked requests, in
    /// milliseconds. Bounds how late a timed-out poll is answered.
    pub sweep_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_timeout_ms: 60_000,
            sweep_interval_ms: 250,
        }
    }
}
