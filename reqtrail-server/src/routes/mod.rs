//! HTTP routes and the shared envelope rendering.

pub mod health;
pub mod todos;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use reqtrail::context::correlation_id;
use reqtrail::response::{ErrorCode, ResponseBuilder, MESSAGE_FAILED, MESSAGE_OK};
use reqtrail::Environment;
use serde_json::Value;
use tracing::error;

/// Renders a response envelope stamped with the current correlation id.
pub fn envelope<E: ErrorCode + ?Sized>(
    environment: Environment,
    status: StatusCode,
    error: Option<&E>,
    data: Option<Value>,
) -> Response {
    let transaction_id = correlation_id().map_or_else(
        |failure| {
            error!(error = %failure, "rendering a response outside a request context");
            String::new()
        },
        |id| id.to_string(),
    );

    let body = ResponseBuilder::new(environment)
        .transaction_id(transaction_id)
        .message(if error.is_some() {
            MESSAGE_FAILED
        } else {
            MESSAGE_OK
        })
        .error(error)
        .data(data)
        .build();

    (status, Json(body)).into_response()
}
