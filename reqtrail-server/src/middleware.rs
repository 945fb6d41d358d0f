//! Entry middleware establishing the execution context of every request.

use std::collections::BTreeMap;

use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, Query, RawPathParams, Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use reqtrail::context::{create_context, ContextTracker, RequestMetadata};
use serde_json::Value;
use tracing::{error, info_span, Instrument};

/// Largest request body the server buffers.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Buffers the request, records its metadata and runs the rest of the stack
/// inside a fresh tracked unit carrying the request's context.
///
/// Bodies that are not JSON are recorded as `null` and still reach the
/// handler unchanged.
pub async fn execution_context(
    State(tracker): State<ContextTracker>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();

    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(error) => {
            error!(error = %error, "failed to buffer request body");
            return (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response();
        }
    };

    let mut metadata = RequestMetadata::new(parts.method.as_str(), parts.uri.to_string())
        .with_body(serde_json::from_slice::<Value>(&bytes).unwrap_or(Value::Null));

    if let Ok(Query(query)) = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri) {
        metadata.query = query;
    }
    if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
        for (key, value) in &params {
            metadata = metadata.with_param(key, value);
        }
    }

    let request = Request::from_parts(parts, Body::from(bytes));

    tracker
        .scope(async move {
            let record = match create_context(metadata) {
                Ok(record) => record,
                Err(error) => {
                    error!(error = %error, "failed to create execution context");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            };

            let span = info_span!(
                "request",
                correlation_id = %record.correlation_id,
                method = %record.request.method,
                url = %record.request.url,
            );
            next.run(request).instrument(span).await
        })
        .await
}
