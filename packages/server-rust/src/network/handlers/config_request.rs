//! Long-poll config request endpoint and the statistics page.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

use super::AppState;
use crate::network::HealthState;
use crate::service::ServiceError;

/// Handles POST requests carrying one request frame.
///
/// The body is a binary request frame; the response body is a binary
/// response frame. The handler may hold the connection open for the length
/// of the client's long-poll budget.
///
/// Requests are rejected with 503 outside the `Ready` state so the parked
/// queue cannot grow during startup or drain.
pub async fn config_request_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let _guard = state.shutdown.in_flight_guard();
    if state.shutdown.health_state() != HealthState::Ready {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is not ready").into_response();
    }

    match state.service.handle_frame(&body).await {
        Ok(frame) => (
            [("content-type", "application/octet-stream")],
            frame.encode(),
        )
            .into_response(),
        Err(error @ ServiceError::MalformedRequest(_)) => {
            tracing::debug!(%error, "rejecting unreadable request");
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
        Err(error) => {
            tracing::error!(%error, "failed to answer config request");
            (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response()
        }
    }
}

/// Returns the parked-queue summary as plain text.
pub async fn statistics_handler(State(state): State<AppState>) -> String {
    state.service.statistics()
}
