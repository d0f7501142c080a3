//! Ownership guard applied at resolution time.
//!
//! A long poll can sit parked for up to a minute, and in that window the
//! requesting host may be moved to another application or dropped entirely.
//! Serving the parked request from the application it was parked under would
//! then hand the host another application's config. The guard re-checks
//! ownership against the live registry at the moment a response is produced
//! and, when ownership changed, answers neutrally instead: a success response
//! carrying the empty payload at the request's own baseline generation. The
//! client keeps polling and its next request lands on the right application.

use std::sync::Arc;

use confab_core::{ApplicationId, ConfigPayload, Payload, ServerConfigRequest};

use crate::traits::HostRegistry;

/// What a delayed request was parked under, captured at enqueue time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    /// Application the request's host belonged to when it was parked.
    pub application: ApplicationId,
}

/// Re-checks host ownership before any response is produced.
#[derive(Clone)]
pub struct ResolutionGuard {
    hosts: Arc<dyn HostRegistry>,
}

impl ResolutionGuard {
    #[must_use]
    pub fn new(hosts: Arc<dyn HostRegistry>) -> Self {
        Self { hosts }
    }

    /// The application currently owning `hostname`, looked up fresh.
    pub async fn current_owner(&self, hostname: &str) -> Option<ApplicationId> {
        self.hosts.application_for_host(hostname).await
    }

    /// Whether `hostname` still belongs to `application`.
    pub async fn still_owned_by(&self, hostname: &str, application: &ApplicationId) -> bool {
        self.hosts.is_host_owned_by(hostname, application).await
    }

    /// Resolves `request` with the neutral outcome: a success response whose
    /// payload is the empty config and whose generation is the request's own
    /// baseline, so the client's generation never moves backwards. Returns
    /// whether this call won the resolution.
    pub fn resolve_neutral(request: &ServerConfigRequest) -> bool {
        let empty = ConfigPayload::empty();
        let canonical = empty.canonical_bytes();
        let payload = Payload::from_config_compressed(&empty, request.compression());
        request.add_ok_response(request.baseline_generation(), &canonical, Some(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use confab_core::protocol::{ConfigResponse, RequestEnvelope};
    use confab_core::{ChecksumType, Generation};
    use parking_lot::Mutex;

    struct SingleBinding {
        binding: Mutex<Option<(String, ApplicationId)>>,
    }

    #[async_trait]
    impl HostRegistry for SingleBinding {
        async fn application_for_host(&self, hostname: &str) -> Option<ApplicationId> {
            self.binding
                .lock()
                .as_ref()
                .filter(|(host, _)| host == hostname)
                .map(|(_, app)| app.clone())
        }
    }

    fn request() -> ServerConfigRequest {
        let envelope = RequestEnvelope::parse(
            br#"{"version":3,"defName":"search","defNamespace":"config","clientHostname":"node1",
                "currentGeneration":5,
                "checksums":[{"type":"md5","value":"d41d8cd98f00b204e9800998ecf8427e"}]}"#,
        )
        .unwrap();
        ServerConfigRequest::from_envelope(envelope).unwrap()
    }

    #[tokio::test]
    async fn ownership_is_looked_up_fresh_every_time() {
        let registry = Arc::new(SingleBinding {
            binding: Mutex::new(Some(("node1".to_string(), ApplicationId::new("t", "a")))),
        });
        let guard = ResolutionGuard::new(registry.clone());
        let app = ApplicationId::new("t", "a");

        assert!(guard.still_owned_by("node1", &app).await);

        *registry.binding.lock() = Some(("node1".to_string(), ApplicationId::new("t", "b")));
        assert!(!guard.still_owned_by("node1", &app).await);
        assert_eq!(
            guard.current_owner("node1").await,
            Some(ApplicationId::new("t", "b"))
        );

        *registry.binding.lock() = None;
        assert_eq!(guard.current_owner("node1").await, None);
    }

    #[tokio::test]
    async fn neutral_resolution_keeps_the_baseline_generation() {
        let request = request();
        assert!(ResolutionGuard::resolve_neutral(&request));

        let ConfigResponse::Ok(ok) = request.response().unwrap() else {
            panic!("neutral outcome must be a success");
        };
        assert_eq!(ok.generation, Generation(5));
        let payload = ok.payload.as_ref().unwrap();
        assert_eq!(payload.to_config().unwrap(), ConfigPayload::empty());
        // The digest types echo the request: md5 only here.
        assert!(ok.checksums.get(ChecksumType::Md5).is_some());
        assert!(ok.checksums.get(ChecksumType::XxHash64).is_none());
    }

    #[tokio::test]
    async fn neutral_resolution_loses_to_an_earlier_outcome() {
        let request = request();
        let config = ConfigPayload::empty();
        request.add_ok_response(Generation(7), &config.canonical_bytes(), None);

        assert!(!ResolutionGuard::resolve_neutral(&request));
        let ConfigResponse::Ok(ok) = request.response().unwrap() else {
            panic!("expected success");
        };
        assert_eq!(ok.generation, Generation(7));
    }
}
