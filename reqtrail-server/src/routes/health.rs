use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use reqtrail::health::HealthStatus;
use reqtrail::response::ErrorCode;
use serde::Serialize;
use tracing::error;

use super::envelope;
use crate::AppState;

/// Code reported when the health report can not be rendered.
struct HealthReportFailed;

impl ErrorCode for HealthReportFailed {
    fn code(&self) -> u16 {
        500
    }
}

#[derive(Debug, Serialize)]
struct CheckSummary<'a> {
    name: &'a str,
    status: HealthStatus,
    message: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthData<'a> {
    status: HealthStatus,
    checks: Vec<CheckSummary<'a>>,
    shutdown_hooks: Vec<String>,
}

/// Routes under `/healthcheck`.
pub fn router() -> Router<AppState> {
    Router::new().route("/healthcheck", get(healthcheck))
}

/// Runs every registered check and lists the pending shutdown hooks.
pub async fn healthcheck(State(state): State<AppState>) -> Response {
    let report = state.health.run().await;

    let data = HealthData {
        status: report.status,
        checks: report
            .checks
            .iter()
            .map(|named| CheckSummary {
                name: &named.name,
                status: named.result.status,
                message: &named.result.message,
            })
            .collect(),
        shutdown_hooks: state.shutdown.hook_names(),
    };

    match serde_json::to_value(&data) {
        Ok(data) => envelope::<HealthReportFailed>(
            state.environment,
            StatusCode::OK,
            None,
            Some(data),
        ),
        Err(failure) => {
            error!(error = %failure, "failed to render health report");
            envelope(
                state.environment,
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(&HealthReportFailed),
                None,
            )
        }
    }
}
