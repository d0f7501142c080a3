//! Long-poll request handling pipeline.
//!
//! This module implements the server side of the subscription protocol:
//!
//! 1. **Decode** a request frame and validate its parameters
//! 2. **Ownership**: map the requesting host to its application
//! 3. **Resolve** the requested config against the application's active set
//! 4. **Respond or park**: changed content answers at once, an up-to-date
//!    client is parked until an activation, its timeout, or server drain
//! 5. **Background worker** (`worker`): activation fan-out and expiry sweeps

pub mod config;
pub mod worker;

// Re-export key types for convenient access.
pub use config::ServiceConfig;
pub use worker::{BackgroundRunnable, BackgroundWorker, WorkerHandle};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use confab_core::protocol::{ConfigResponse, ErrorCode, ErrorResponse};
use confab_core::{
    ApplicationId, ClockSource, Frame, Generation, Payload, ProtocolError, ProtocolVersion,
    ServerConfigRequest, SystemClock,
};
use metrics::{counter, histogram};
use thiserror::Error;

use crate::delayed::DelayedResponses;
use crate::guard::{ResolutionContext, ResolutionGuard};
use crate::network::shutdown::{HealthState, ShutdownController};
use crate::traits::{ActivationListener, ConfigResolver, HostRegistry};

/// Trace level for request arrival notes.
const TRACE_REQUEST: u32 = 1;
/// Trace level for resolution outcome notes.
const TRACE_RESOLVE: u32 = 2;

// ---------------------------------------------------------------------------
// ServiceError
// ---------------------------------------------------------------------------

/// Failures that cannot be expressed as an in-protocol error response.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request bytes do not decode to a frame with a readable envelope.
    #[error("malformed request: {0}")]
    MalformedRequest(#[source] ProtocolError),
    /// A resolved outcome failed to encode.
    #[error("failed to encode response: {0}")]
    ResponseEncoding(#[source] ProtocolError),
}

// ---------------------------------------------------------------------------
// ConfigRequestService
// ---------------------------------------------------------------------------

/// How far a resolution pass is allowed to go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResolveMode {
    /// First pass over a fresh request. An up-to-date client may be parked.
    Initial,
    /// Pass over a previously parked request. Always answers.
    Final,
}

/// What a resolution pass did with the request.
enum Resolution {
    /// The request carries an outcome and can be encoded.
    Responded,
    /// The request is up to date; park it under its owning application.
    Park(ApplicationId),
}

/// The long-poll pipeline: decodes frames, resolves them against the
/// injected [`ConfigResolver`], and parks up-to-date clients.
pub struct ConfigRequestService {
    resolver: Arc<dyn ConfigResolver>,
    guard: ResolutionGuard,
    delayed: DelayedResponses,
    config: ServiceConfig,
}

impl ConfigRequestService {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        hosts: Arc<dyn HostRegistry>,
        config: ServiceConfig,
    ) -> Self {
        Self::with_clock(resolver, hosts, config, Arc::new(SystemClock))
    }

    /// Builds the service on an injected clock, for deterministic tests.
    pub fn with_clock(
        resolver: Arc<dyn ConfigResolver>,
        hosts: Arc<dyn HostRegistry>,
        config: ServiceConfig,
        clock: Arc<dyn ClockSource>,
    ) -> Self {
        Self {
            resolver,
            guard: ResolutionGuard::new(hosts),
            delayed: DelayedResponses::with_clock(clock),
            config,
        }
    }

    /// Handles one request frame end to end and returns the response frame.
    ///
    /// Protocol-level failures (bad parameters, unknown definition, an
    /// unsupported version) come back as error response frames; only bytes
    /// that cannot be decoded at all, or outcomes that cannot be encoded,
    /// surface as [`ServiceError`].
    pub async fn handle_frame(&self, bytes: &[u8]) -> Result<Frame, ServiceError> {
        let frame = Frame::decode(bytes).map_err(ServiceError::MalformedRequest)?;
        let request = match ServerConfigRequest::from_frame(&frame) {
            Ok(request) => Arc::new(request),
            Err(ProtocolError::UnsupportedVersion(number)) => {
                // The envelope is readable but speaks a version we do not.
                // Answer in the current version; the field is this server's
                // only self-describing one.
                return self.unsupported_version_frame(number);
            }
            Err(error) => return Err(ServiceError::MalformedRequest(error)),
        };

        counter!("confab_requests_total").increment(1);
        {
            let mut trace = request.trace();
            if trace.should_trace(TRACE_REQUEST) {
                trace.trace(TRACE_REQUEST, format!("handling request: {request}"));
            }
        }

        if let Err(error) = request.validate_parameters() {
            tracing::debug!(%request, %error, "rejecting request with invalid parameters");
            request.add_error_response(error.code, error.message);
            return self.encode_response(&request);
        }

        if let Resolution::Park(application) = self.resolve(&request, ResolveMode::Initial).await {
            let context = ResolutionContext { application };
            if let Some(receiver) =
                self.delayed
                    .delay(Arc::clone(&request), context, self.config.max_timeout_ms)
            {
                // Wakes on activation, expiry sweep, or drain. A dropped
                // sender means the entry was claimed without completion;
                // the fallback below covers it.
                let _ = receiver.await;
            }
            if request.response().is_none() {
                request.add_error_response(ErrorCode::InternalError, "delayed response was dropped");
            }
        }

        self.encode_response(&request)
    }

    /// Re-resolves every request parked under `application`.
    ///
    /// Called by the background worker after an activation. Requests whose
    /// host has moved to another application since they were parked get a
    /// neutral answer instead of the new owner's config.
    pub async fn resolve_activated(&self, application: &ApplicationId) {
        for id in self.delayed.ids_for(application) {
            let Some(entry) = self.delayed.cancel_and_remove(id) else {
                continue;
            };
            let request = Arc::clone(entry.request());
            if !self
                .guard
                .still_owned_by(request.client_hostname(), &entry.context().application)
                .await
            {
                ResolutionGuard::resolve_neutral(&request);
            } else {
                self.resolve(&request, ResolveMode::Final).await;
            }
            entry.complete();
        }
    }

    /// Answers every parked request whose timeout budget has run out.
    pub async fn sweep_expired(&self) {
        for entry in self.delayed.remove_expired() {
            let request = Arc::clone(entry.request());
            tracing::debug!(%request, "long poll timed out");
            if !self
                .guard
                .still_owned_by(request.client_hostname(), &entry.context().application)
                .await
            {
                ResolutionGuard::resolve_neutral(&request);
            } else {
                self.resolve(&request, ResolveMode::Final).await;
            }
            entry.complete();
        }
    }

    /// Fails every parked request so their connections can close.
    ///
    /// Used during shutdown: a parked poll holds its connection open, and
    /// graceful connection draining cannot finish until it is answered.
    pub async fn drain_delayed(&self) {
        let drained = self.delayed.drain_all();
        if drained.is_empty() {
            return;
        }
        tracing::info!(count = drained.len(), "draining parked requests for shutdown");
        for entry in drained {
            entry
                .request()
                .add_error_response(ErrorCode::InternalError, "server shutting down");
            entry.complete();
        }
    }

    /// Human-readable queue summary for the statistics endpoint.
    #[must_use]
    pub fn statistics(&self) -> String {
        self.delayed.stats().to_string()
    }

    /// Number of currently parked requests.
    #[must_use]
    pub fn parked_count(&self) -> usize {
        self.delayed.len()
    }

    /// One resolution pass. Every outcome except `Park` leaves the request
    /// resolved.
    async fn resolve(&self, request: &Arc<ServerConfigRequest>, mode: ResolveMode) -> Resolution {
        let started = Instant::now();
        let resolution = self.resolve_pass(request, mode).await;
        histogram!("confab_resolve_duration_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        resolution
    }

    async fn resolve_pass(
        &self,
        request: &Arc<ServerConfigRequest>,
        mode: ResolveMode,
    ) -> Resolution {
        let hostname = request.client_hostname();
        let Some(owner) = self.guard.current_owner(hostname).await else {
            request.add_error_response(
                ErrorCode::ApplicationNotLoaded,
                format!("no application owns host '{hostname}'"),
            );
            return Resolution::Responded;
        };

        let key = request.key();
        let node_version = request.node_version();
        let resolved = match self.resolver.resolve(&owner, &key, node_version.as_ref()).await {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                request.add_error_response(
                    ErrorCode::UnknownDefinition,
                    format!("no config '{key}' for application {owner}"),
                );
                return Resolution::Responded;
            }
            Err(error) => {
                tracing::error!(%request, error = format!("{error:#}"), "resolver failed");
                request.add_error_response(ErrorCode::InternalError, format!("{error:#}"));
                return Resolution::Responded;
            }
        };

        let baseline_generation = request.baseline_generation();
        if resolved.generation < baseline_generation {
            request.add_error_response(
                ErrorCode::OutdatedConfig,
                format!(
                    "client generation {} is ahead of server generation {}",
                    baseline_generation, resolved.generation
                ),
            );
            return Resolution::Responded;
        }

        let canonical = resolved.payload.canonical_bytes();
        let changed = !request
            .baseline_checksums()
            .matches(&request.response_checksums(&canonical));

        if changed {
            self.trace_outcome(request, "returning changed config", resolved.generation);
            let payload = Payload::from_config_compressed(&resolved.payload, request.compression());
            request.add_ok_response(resolved.generation, &canonical, Some(payload));
            return Resolution::Responded;
        }

        if resolved.generation > baseline_generation {
            // Same bytes under a newer generation: confirm the generation
            // without shipping the content again.
            self.trace_outcome(request, "returning new generation", resolved.generation);
            request.add_ok_response(resolved.generation, &canonical, None);
            return Resolution::Responded;
        }

        if mode == ResolveMode::Final || request.timeout_ms() == 0 {
            self.trace_outcome(request, "config unchanged", resolved.generation);
            request.add_ok_response(resolved.generation, &canonical, None);
            return Resolution::Responded;
        }

        Resolution::Park(owner)
    }

    fn trace_outcome(&self, request: &ServerConfigRequest, what: &str, generation: Generation) {
        let mut trace = request.trace();
        if trace.should_trace(TRACE_RESOLVE) {
            trace.trace(TRACE_RESOLVE, format!("{what} at generation {generation}"));
        }
    }

    fn encode_response(&self, request: &ServerConfigRequest) -> Result<Frame, ServiceError> {
        request
            .to_response_frame()
            .map_err(ServiceError::ResponseEncoding)
    }

    fn unsupported_version_frame(&self, number: u64) -> Result<Frame, ServiceError> {
        let response = ConfigResponse::Error(ErrorResponse::new(
            ErrorCode::IllegalProtocolVersion,
            format!("unsupported protocol version {number}"),
        ));
        response
            .to_frame(ProtocolVersion::CURRENT, None)
            .map_err(ServiceError::ResponseEncoding)
    }
}

// ---------------------------------------------------------------------------
// Activation fan-out
// ---------------------------------------------------------------------------

/// A newly activated generation for one application.
#[derive(Debug, Clone)]
pub struct ActivationEvent {
    pub application: ApplicationId,
    pub generation: Generation,
}

/// Bridges synchronous activation callbacks into the background worker.
#[derive(Debug, Clone)]
pub struct ActivationSender {
    handle: WorkerHandle<ActivationEvent>,
}

impl ActivationSender {
    #[must_use]
    pub fn new(handle: WorkerHandle<ActivationEvent>) -> Self {
        Self { handle }
    }
}

impl ActivationListener for ActivationSender {
    fn on_activation(&self, application: &ApplicationId, generation: Generation) {
        let event = ActivationEvent {
            application: application.clone(),
            generation,
        };
        if let Err(error) = self.handle.try_submit(event) {
            // Parked polls still resolve on their timeout budget.
            tracing::warn!(%application, %error, "dropping activation event");
        }
    }
}

/// Worker loop body: fans activations out to parked polls, sweeps expired
/// entries on every tick, and drains the queue once the server starts
/// shutting down.
pub struct ActivationRunnable {
    service: Arc<ConfigRequestService>,
    shutdown: Arc<ShutdownController>,
}

impl ActivationRunnable {
    #[must_use]
    pub fn new(service: Arc<ConfigRequestService>, shutdown: Arc<ShutdownController>) -> Self {
        Self { service, shutdown }
    }
}

#[async_trait]
impl BackgroundRunnable for ActivationRunnable {
    type Task = ActivationEvent;

    async fn run(&mut self, event: ActivationEvent) {
        counter!("confab_activations_total").increment(1);
        tracing::debug!(
            application = %event.application,
            generation = %event.generation,
            "fanning activation out to parked requests"
        );
        self.service.resolve_activated(&event.application).await;
    }

    async fn on_tick(&mut self) {
        self.service.sweep_expired().await;
        if self.shutdown.health_state() == HealthState::Draining {
            self.service.drain_delayed().await;
        }
    }

    async fn shutdown(&mut self) {
        self.service.drain_delayed().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use confab_core::clock::ManualClock;
    use confab_core::{ClientConfigRequest, ConfigKey, ConfigPayload, NodeVersion};
    use parking_lot::Mutex;

    use super::*;
    use crate::traits::ResolvedConfig;

    struct StaticResolver {
        configs: Mutex<HashMap<(ApplicationId, ConfigKey), ResolvedConfig>>,
    }

    impl StaticResolver {
        fn new() -> Self {
            Self {
                configs: Mutex::new(HashMap::new()),
            }
        }

        fn put(&self, application: &ApplicationId, key: &ConfigKey, json: &str, generation: u64) {
            self.configs.lock().insert(
                (application.clone(), key.clone()),
                ResolvedConfig {
                    payload: ConfigPayload::from_json_str(json).unwrap(),
                    generation: Generation(generation),
                },
            );
        }
    }

    #[async_trait]
    impl ConfigResolver for StaticResolver {
        async fn resolve(
            &self,
            application: &ApplicationId,
            key: &ConfigKey,
            _node_version: Option<&NodeVersion>,
        ) -> anyhow::Result<Option<ResolvedConfig>> {
            Ok(self
                .configs
                .lock()
                .get(&(application.clone(), key.clone()))
                .cloned())
        }
    }

    struct StaticHosts {
        bindings: Mutex<HashMap<String, ApplicationId>>,
    }

    impl StaticHosts {
        fn new() -> Self {
            Self {
                bindings: Mutex::new(HashMap::new()),
            }
        }

        fn bind(&self, hostname: &str, application: &ApplicationId) {
            self.bindings
                .lock()
                .insert(hostname.to_string(), application.clone());
        }
    }

    #[async_trait]
    impl HostRegistry for StaticHosts {
        async fn application_for_host(&self, hostname: &str) -> Option<ApplicationId> {
            self.bindings.lock().get(hostname).cloned()
        }
    }

    fn app() -> ApplicationId {
        ApplicationId::new("acme", "music")
    }

    fn key() -> ConfigKey {
        ConfigKey::new("query-profiles", "search", "clusters/music")
    }

    struct Fixture {
        resolver: Arc<StaticResolver>,
        hosts: Arc<StaticHosts>,
        service: Arc<ConfigRequestService>,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let resolver = Arc::new(StaticResolver::new());
        let hosts = Arc::new(StaticHosts::new());
        let clock = Arc::new(ManualClock::new(0));
        let service = Arc::new(ConfigRequestService::with_clock(
            Arc::clone(&resolver) as Arc<dyn ConfigResolver>,
            Arc::clone(&hosts) as Arc<dyn HostRegistry>,
            ServiceConfig::default(),
            clock.clone(),
        ));
        Fixture {
            resolver,
            hosts,
            service,
            clock,
        }
    }

    fn poll(timeout_ms: u64) -> ClientConfigRequest {
        ClientConfigRequest::new(key(), "node1.music").with_timeout_ms(timeout_ms)
    }

    async fn exchange(
        service: &ConfigRequestService,
        client: &mut ClientConfigRequest,
    ) -> Result<(), String> {
        let bytes = client.to_frame().map_err(|e| e.to_string())?.encode();
        let frame = service
            .handle_frame(&bytes)
            .await
            .map_err(|e| e.to_string())?;
        client.read_response(&frame).map_err(|e| e.to_string())
    }

    // ---- immediate resolution ----

    #[tokio::test]
    async fn first_poll_returns_full_payload() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 7);

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();

        assert_eq!(client.error_code(), None);
        assert!(client.has_updated_config());
        assert_eq!(client.response_generation(), Some(Generation(7)));
        let payload = client.response_payload().unwrap();
        let config = payload.to_config().unwrap();
        assert_eq!(config.canonical_bytes(), br#"{"field":"value"}"#);
    }

    #[tokio::test]
    async fn unknown_host_is_not_loaded() {
        let fx = fixture();
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 7);

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();

        assert_eq!(client.error_code(), Some(ErrorCode::ApplicationNotLoaded.code()));
    }

    #[tokio::test]
    async fn unknown_definition_is_an_error() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();

        assert_eq!(client.error_code(), Some(ErrorCode::UnknownDefinition.code()));
    }

    #[tokio::test]
    async fn client_ahead_of_server_is_outdated() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 3);

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();
        // Server later rolls back below the adopted baseline.
        let mut next = client.next_request();
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 1);
        exchange(&fx.service, &mut next).await.unwrap();

        assert_eq!(next.error_code(), Some(ErrorCode::OutdatedConfig.code()));
    }

    #[tokio::test]
    async fn same_content_newer_generation_skips_payload() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 3);

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 4);
        exchange(&fx.service, &mut next).await.unwrap();

        assert_eq!(next.error_code(), None);
        assert!(!next.has_updated_config());
        assert!(next.has_updated_generation());
        assert_eq!(next.response_generation(), Some(Generation(4)));
        assert!(next.response_payload().is_none());
    }

    #[tokio::test]
    async fn zero_timeout_answers_unchanged_immediately() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"value"}"#, 3);

        let mut client = poll(0);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();
        exchange(&fx.service, &mut next).await.unwrap();

        assert_eq!(next.error_code(), None);
        assert!(!next.has_updated_config());
        assert!(!next.has_updated_generation());
        assert_eq!(next.response_generation(), Some(Generation(3)));
    }

    // ---- parked long polls ----

    #[tokio::test]
    async fn parked_poll_resolves_on_activation() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"v1"}"#, 1);

        let mut client = poll(30_000);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();

        let bytes = next.to_frame().unwrap().encode();
        let service = Arc::clone(&fx.service);
        let parked = tokio::spawn(async move { service.handle_frame(&bytes).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        fx.resolver.put(&app(), &key(), r#"{"field":"v2"}"#, 2);
        fx.service.resolve_activated(&app()).await;

        let frame = parked.await.unwrap().unwrap();
        next.read_response(&frame).unwrap();
        assert!(next.has_updated_config());
        assert_eq!(next.response_generation(), Some(Generation(2)));
        let config = next.response_payload().unwrap().to_config().unwrap();
        assert_eq!(config.canonical_bytes(), br#"{"field":"v2"}"#);
    }

    #[tokio::test]
    async fn parked_poll_times_out_unchanged() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"v1"}"#, 1);

        let mut client = poll(30_000);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();

        let bytes = next.to_frame().unwrap().encode();
        let service = Arc::clone(&fx.service);
        let parked = tokio::spawn(async move { service.handle_frame(&bytes).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        fx.clock.advance(120_000);
        fx.service.sweep_expired().await;

        let frame = parked.await.unwrap().unwrap();
        next.read_response(&frame).unwrap();
        assert_eq!(next.error_code(), None);
        assert!(!next.has_updated_config());
        assert_eq!(next.response_generation(), Some(Generation(1)));
    }

    #[tokio::test]
    async fn moved_host_gets_neutral_answer() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"v1"}"#, 1);

        let mut client = poll(30_000);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();

        let bytes = next.to_frame().unwrap().encode();
        let service = Arc::clone(&fx.service);
        let parked = tokio::spawn(async move { service.handle_frame(&bytes).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // The host is redeployed under another application while parked.
        let other = ApplicationId::new("acme", "books");
        fx.hosts.bind("node1.music", &other);
        fx.resolver.put(&other, &key(), r#"{"field":"other"}"#, 9);
        fx.service.resolve_activated(&app()).await;

        let frame = parked.await.unwrap().unwrap();
        next.read_response(&frame).unwrap();
        // Not the new owner's config: an empty payload at the client's own
        // baseline generation.
        assert_eq!(next.error_code(), None);
        assert_eq!(next.response_generation(), Some(Generation(1)));
        let config = next.response_payload().unwrap().to_config().unwrap();
        assert_eq!(config.canonical_bytes(), b"{}");
    }

    #[tokio::test]
    async fn drain_fails_parked_polls() {
        let fx = fixture();
        fx.hosts.bind("node1.music", &app());
        fx.resolver.put(&app(), &key(), r#"{"field":"v1"}"#, 1);

        let mut client = poll(30_000);
        exchange(&fx.service, &mut client).await.unwrap();
        let mut next = client.next_request();

        let bytes = next.to_frame().unwrap().encode();
        let service = Arc::clone(&fx.service);
        let parked = tokio::spawn(async move { service.handle_frame(&bytes).await });
        tokio::time::sleep(Duration::from_millis(50)).await;

        fx.service.drain_delayed().await;

        let frame = parked.await.unwrap().unwrap();
        next.read_response(&frame).unwrap();
        assert_eq!(next.error_code(), Some(ErrorCode::InternalError.code()));
    }

    // ---- malformed input ----

    #[tokio::test]
    async fn garbage_bytes_are_malformed() {
        let fx = fixture();
        let result = fx.service.handle_frame(b"\x00\x00\x00\x02{}").await;
        assert!(matches!(result, Err(ServiceError::MalformedRequest(_))));
    }

    #[tokio::test]
    async fn unsupported_version_gets_protocol_error_frame() {
        let fx = fixture();
        let envelope = br#"{"version":9}"#;
        let frame = Frame::new(envelope.to_vec(), Vec::new()).encode();

        let response = fx.service.handle_frame(&frame).await.unwrap();
        let decoded = ConfigResponse::from_frame(&response).unwrap();
        assert_eq!(
            decoded.response.error_code(),
            ErrorCode::IllegalProtocolVersion.code()
        );
    }

    #[tokio::test]
    async fn invalid_parameters_get_specific_code() {
        let fx = fixture();
        let envelope = br#"{"version":3,"defName":"UPPER CASE","defNamespace":"search","clientHostname":"node1"}"#;
        let frame = Frame::new(envelope.to_vec(), Vec::new()).encode();

        let response = fx.service.handle_frame(&frame).await.unwrap();
        let decoded = ConfigResponse::from_frame(&response).unwrap();
        assert_eq!(
            decoded.response.error_code(),
            ErrorCode::IllegalDefName.code()
        );
    }

    #[tokio::test]
    async fn statistics_reports_queue_depth() {
        let fx = fixture();
        assert_eq!(fx.service.statistics(), "delayed responses: 0 (average age 0 ms)");
    }
}
