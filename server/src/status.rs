//! Read-only HTTP health endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::sync::oneshot;

use crate::game_loop::GameCommand;
use crate::ws::AppState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub status: String,
    pub player_count: usize,
    pub food_count: usize,
    pub uptime_seconds: u64,
}

/// `GET /status` and `GET /health`: current counts and uptime, answered by
/// the game loop without mutating anything.
pub async fn status_handler(State(app_state): State<AppState>) -> Response {
    let (resp_tx, resp_rx) = oneshot::channel();
    if app_state
        .game_tx
        .send(GameCommand::Status { response: resp_tx })
        .await
        .is_err()
    {
        tracing::error!("Failed to send Status command");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    match resp_rx.await {
        Ok(report) => Json(report).into_response(),
        Err(_) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
