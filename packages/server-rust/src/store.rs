//! In-memory application store backed by [`DashMap`].
//!
//! Holds each application's staged and active config sets plus the host
//! bindings, and notifies registered listeners when a generation activates.
//! Suitable for development, testing, and single-node deployments where the
//! whole config set fits in memory.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::bail;
use async_trait::async_trait;
use confab_core::{ApplicationId, ConfigKey, ConfigPayload, Generation, NodeVersion};
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::traits::{ActivationListener, ConfigResolver, HostRegistry, ResolvedConfig};

#[derive(Debug, Default)]
struct ApplicationState {
    generation: Generation,
    staged: HashMap<ConfigKey, ConfigPayload>,
    active: HashMap<ConfigKey, ConfigPayload>,
}

/// Concurrent store of applications, their config sets, and host ownership.
///
/// Writes stage into a pending set; [`MemoryConfigStore::activate`] swaps the
/// staged set in atomically under the next generation. Readers only ever see
/// fully activated sets.
pub struct MemoryConfigStore {
    applications: DashMap<ApplicationId, ApplicationState>,
    hosts: DashMap<String, ApplicationId>,
    listeners: RwLock<Vec<Arc<dyn ActivationListener>>>,
}

impl MemoryConfigStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            applications: DashMap::new(),
            hosts: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Stages `payload` for `key`, creating the application if needed.
    ///
    /// Staged content is invisible to resolution until the next
    /// [`MemoryConfigStore::activate`] call.
    pub fn stage(&self, application: &ApplicationId, key: ConfigKey, payload: ConfigPayload) {
        self.applications
            .entry(application.clone())
            .or_default()
            .staged
            .insert(key, payload);
    }

    /// Activates the staged set under the application's next generation and
    /// notifies listeners.
    ///
    /// # Errors
    ///
    /// Fails when the application has never been staged.
    pub fn activate(&self, application: &ApplicationId) -> anyhow::Result<Generation> {
        let generation = {
            let Some(mut state) = self.applications.get_mut(application) else {
                bail!("unknown application {application}");
            };
            state.active = state.staged.clone();
            state.generation = state.generation.next();
            state.generation
            // Shard guard dropped here; listeners run without it.
        };

        tracing::info!(%application, %generation, "activated config generation");
        for listener in self.listeners.read().iter() {
            listener.on_activation(application, generation);
        }
        Ok(generation)
    }

    /// The application's current active generation.
    #[must_use]
    pub fn generation_of(&self, application: &ApplicationId) -> Option<Generation> {
        self.applications
            .get(application)
            .map(|state| state.generation)
    }

    /// Assigns `hostname` to `application`, replacing any prior binding.
    pub fn bind_host(&self, hostname: impl Into<String>, application: &ApplicationId) {
        self.hosts.insert(hostname.into(), application.clone());
    }

    /// Removes the binding for `hostname`, if any.
    pub fn release_host(&self, hostname: &str) {
        self.hosts.remove(hostname);
    }

    /// Registers a listener for future activations.
    pub fn add_listener(&self, listener: Arc<dyn ActivationListener>) {
        self.listeners.write().push(listener);
    }
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigResolver for MemoryConfigStore {
    // Content here is version-independent; `node_version` is accepted for the
    // trait and ignored.
    async fn resolve(
        &self,
        application: &ApplicationId,
        key: &ConfigKey,
        _node_version: Option<&NodeVersion>,
    ) -> anyhow::Result<Option<ResolvedConfig>> {
        Ok(self.applications.get(application).and_then(|state| {
            state.active.get(key).map(|payload| ResolvedConfig {
                payload: payload.clone(),
                generation: state.generation,
            })
        }))
    }
}

#[async_trait]
impl HostRegistry for MemoryConfigStore {
    async fn application_for_host(&self, hostname: &str) -> Option<ApplicationId> {
        self.hosts.get(hostname).map(|entry| entry.value().clone())
    }
}
