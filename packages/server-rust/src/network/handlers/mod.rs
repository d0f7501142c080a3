//! HTTP handler definitions for the config server.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod admin;
pub mod config_request;
pub mod health;

pub use admin::deploy_handler;
pub use config_request::{config_request_handler, statistics_handler};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use crate::network::ShutdownController;
use crate::service::ConfigRequestService;
use crate::store::MemoryConfigStore;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// The long-poll request pipeline.
    pub service: Arc<ConfigRequestService>,
    /// Application store backing deployment endpoints.
    pub store: Arc<MemoryConfigStore>,
    /// Graceful shutdown controller with health state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
