//! Deployment endpoint.
//!
//! Staging, host binding, and activation in one call. This is the
//! operational surface a deploy tool talks to; config clients never use it.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use confab_core::{ApplicationId, ConfigKey, ConfigPayload, Generation};
use serde::{Deserialize, Serialize};

use super::AppState;

/// Body of `POST /admin/v1/deploy`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub tenant: String,
    pub application: String,
    /// Config instances to stage before activating.
    #[serde(default)]
    pub configs: Vec<DeployConfig>,
    /// Hosts to bind to the application.
    #[serde(default)]
    pub hosts: Vec<String>,
}

/// One config instance in a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployConfig {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub config_id: String,
    pub payload: ConfigPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    /// The generation the deployment activated as.
    pub generation: Generation,
}

/// Stages every config in the request, binds the listed hosts, and
/// activates the application's next generation.
pub async fn deploy_handler(
    State(state): State<AppState>,
    Json(request): Json<DeployRequest>,
) -> Result<Json<DeployResponse>, (StatusCode, String)> {
    let application = ApplicationId::new(request.tenant, request.application);

    for config in request.configs {
        let key = ConfigKey::new(config.name, config.namespace, config.config_id);
        state.store.stage(&application, key, config.payload);
    }
    for hostname in request.hosts {
        state.store.bind_host(hostname, &application);
    }

    let generation = state
        .store
        .activate(&application)
        .map_err(|error| (StatusCode::BAD_REQUEST, format!("{error:#}")))?;

    Ok(Json(DeployResponse { generation }))
}
