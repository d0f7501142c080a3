use async_trait::async_trait;
use confab_core::{ApplicationId, ConfigKey, ConfigPayload, Generation, NodeVersion};

/// Active content resolved for one config key.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    /// The payload the application currently serves for the key.
    pub payload: ConfigPayload,
    /// Generation the content was activated at.
    pub generation: Generation,
}

/// Source of active config content.
/// Implementations: in-memory store, deployment repository (future).
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Resolve the active content for `key` within `application`.
    ///
    /// `node_version` is the requesting node's version; resolvers backed by a
    /// deployment model may serve version-dependent content. Returns `None`
    /// when the application does not define the key.
    async fn resolve(
        &self,
        application: &ApplicationId,
        key: &ConfigKey,
        node_version: Option<&NodeVersion>,
    ) -> anyhow::Result<Option<ResolvedConfig>>;
}

/// Maps requesting hosts to the application that owns them.
///
/// Ownership is consulted on every resolution, never cached, so a host that
/// moves between applications stops receiving the old application's config
/// the moment the binding changes.
#[async_trait]
pub trait HostRegistry: Send + Sync {
    /// The loaded application owning `hostname`.
    ///
    /// Returns `None` when the host is unknown or its application is not
    /// loaded yet.
    async fn application_for_host(&self, hostname: &str) -> Option<ApplicationId>;

    /// Whether `hostname` is currently owned by `application`.
    async fn is_host_owned_by(&self, hostname: &str, application: &ApplicationId) -> bool {
        self.application_for_host(hostname).await.as_ref() == Some(application)
    }
}

/// Receives activation events from a config store.
pub trait ActivationListener: Send + Sync {
    /// Called after `application` has activated `generation`.
    fn on_activation(&self, application: &ApplicationId, generation: Generation);
}
