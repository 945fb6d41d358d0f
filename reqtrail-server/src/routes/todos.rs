use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use reqtrail::todos::OperationOutcome;
use serde_json::Value;

use super::envelope;
use crate::AppState;

/// The only API version served.
pub const SUPPORTED_VERSION: &str = "v1";

/// Routes under `/api/{version}/todos`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/{version}/todos", get(get_all).post(create))
        .route(
            "/api/{version}/todos/{id}",
            get(get_by_id).put(update).delete(delete_by_id),
        )
}

fn check_version(version: &str) -> Result<(), Response> {
    if version == SUPPORTED_VERSION {
        Ok(())
    } else {
        Err((StatusCode::BAD_REQUEST, "Unsupported API version").into_response())
    }
}

fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

fn respond(state: &AppState, outcome: OperationOutcome) -> Response {
    let status = StatusCode::from_u16(outcome.status.as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    envelope(state.environment, status, outcome.error.as_ref(), outcome.data)
}

/// `GET /api/{version}/todos`
pub async fn get_all(State(state): State<AppState>, Path(version): Path<String>) -> Response {
    if let Err(rejection) = check_version(&version) {
        return rejection;
    }
    let outcome = state.todos.get_all().await;
    respond(&state, outcome)
}

/// `GET /api/{version}/todos/{id}`
pub async fn get_by_id(
    State(state): State<AppState>,
    Path((version, id)): Path<(String, String)>,
) -> Response {
    if let Err(rejection) = check_version(&version) {
        return rejection;
    }
    let outcome = state.todos.get_by_id(&id).await;
    respond(&state, outcome)
}

/// `POST /api/{version}/todos`
pub async fn create(
    State(state): State<AppState>,
    Path(version): Path<String>,
    body: Bytes,
) -> Response {
    if let Err(rejection) = check_version(&version) {
        return rejection;
    }
    let outcome = state.todos.create(&parse_body(&body)).await;
    respond(&state, outcome)
}

/// `PUT /api/{version}/todos/{id}`
pub async fn update(
    State(state): State<AppState>,
    Path((version, id)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if let Err(rejection) = check_version(&version) {
        return rejection;
    }
    let outcome = state.todos.update(&id, &parse_body(&body)).await;
    respond(&state, outcome)
}

/// `DELETE /api/{version}/todos/{id}`
pub async fn delete_by_id(
    State(state): State<AppState>,
    Path((version, id)): Path<(String, String)>,
) -> Response {
    if let Err(rejection) = check_version(&version) {
        return rejection;
    }
    let outcome = state.todos.delete_by_id(&id).await;
    respond(&state, outcome)
}
