//! Server module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to wire
//! shared state (the worker, activation listeners) between `start()` and
//! `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    config_request_handler, deploy_handler, health_handler, liveness_handler, readiness_handler,
    statistics_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::service::{ConfigRequestService, ServiceConfig};
use crate::store::MemoryConfigStore;
use crate::traits::{ConfigResolver, HostRegistry};

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (store, service, shutdown controller)
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
///
/// The store, service, and shutdown controller are shared via `Arc` so the
/// background worker and activation listeners can reference them after
/// construction.
pub struct ServerModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    service: Arc<ConfigRequestService>,
    store: Arc<MemoryConfigStore>,
    shutdown: Arc<ShutdownController>,
}

impl ServerModule {
    /// Creates a new server module without binding any port.
    ///
    /// The store, service, and shutdown controller are allocated immediately
    /// so they can be wired to the worker before the server starts.
    #[must_use]
    pub fn new(config: NetworkConfig, service_config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryConfigStore::new());
        let service = Arc::new(ConfigRequestService::new(
            Arc::clone(&store) as Arc<dyn ConfigResolver>,
            Arc::clone(&store) as Arc<dyn HostRegistry>,
            service_config,
        ));
        Self {
            config,
            listener: None,
            service,
            store,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Returns a shared reference to the request pipeline.
    #[must_use]
    pub fn service(&self) -> Arc<ConfigRequestService> {
        Arc::clone(&self.service)
    }

    /// Returns a shared reference to the application store.
    #[must_use]
    pub fn store(&self) -> Arc<MemoryConfigStore> {
        Arc::clone(&self.store)
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes:
    /// - `POST /config/v1/request` -- long-poll request frames
    /// - `GET /statistics` -- parked-queue summary, plain text
    /// - `GET /health` -- detailed health JSON
    /// - `GET /health/live` -- Kubernetes liveness probe
    /// - `GET /health/ready` -- Kubernetes readiness probe
    /// - `POST /admin/v1/deploy` -- stage, bind hosts, and activate
    pub fn build_router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/config/v1/request", post(config_request_handler))
            .route("/statistics", get(statistics_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/admin/v1/deploy", post(deploy_handler))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining before the listener closes,
    ///    so the worker starts answering parked polls; their connections
    ///    cannot close until it does
    /// 2. Waits up to 30 seconds for in-flight requests to complete
    /// 3. Health state transitions to Stopped
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .expect("start() must be called before serve()");
        let shutdown_ctrl = self.shutdown;
        let config = self.config;

        // Build the router after extracting all fields from self to avoid
        // partial move issues.
        let state = AppState {
            service: Arc::clone(&self.service),
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&shutdown_ctrl),
            start_time: Instant::now(),
        };

        let layers = build_http_layers(&config);

        let router = Router::new()
            .route("/config/v1/request", post(config_request_handler))
            .route("/statistics", get(statistics_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/admin/v1/deploy", post(deploy_handler))
            .layer(layers)
            .with_state(state);

        // Transition to Ready so readiness probes pass.
        shutdown_ctrl.set_ready();

        info!("Serving config requests");

        let drain_ctrl = Arc::clone(&shutdown_ctrl);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                // Flip to Draining before connection draining begins; until
                // parked polls are answered their connections stay open.
                drain_ctrl.trigger_shutdown();
            })
            .await?;

        let drained = shutdown_ctrl.wait_for_drain(Duration::from_secs(30)).await;
        if drained {
            info!("All requests drained successfully");
        } else {
            warn!("Drain timeout expired with in-flight requests remaining");
        }
        Ok(())
    }
}
