// HTTP route handlers for the Polyrun API

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use polyrun_common::types::{ExecutionRequest, ExecutionResult, LanguageInfo};
use polyrun_engine::ExecutionError;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::ApiError;
use crate::metrics;
use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    #[serde(flatten)]
    pub result: ExecutionResult,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguagesResponse {
    pub languages: Vec<LanguageInfo>,
    pub timeout_seconds: u64,
}

/// POST /execute/code - Run source text and return its output
///
/// The job runs in its own task. If the client goes away the handler future is
/// dropped, the drop guard fires and the job's processes are killed.
pub async fn execute_code(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExecutionRequest>, JsonRejection>,
) -> Result<Json<ExecuteResponse>, ApiError> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let err = ExecutionError::validation(
                format!("Invalid request body: {}", rejection.body_text()),
                state.service.registry().supported(),
            );
            metrics::observe_error(&err);
            return Err(err.into());
        }
    };

    let cancel = CancellationToken::new();
    let _cancel_on_disconnect = cancel.clone().drop_guard();

    let service = Arc::clone(&state.service);
    let outcome = tokio::spawn(async move { service.execute_with_cancel(request, cancel).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Execution task panicked");
            ApiError::Execution {
                message: "Execution task failed".to_string(),
                output: e.to_string(),
            }
        })?;

    match outcome {
        Ok(result) => {
            metrics::observe_result(&result);
            info!(
                job_id = %result.job_id,
                language = %result.language,
                outcome = %result.outcome,
                duration_ms = result.duration_ms,
                "Job completed"
            );
            let executed_at = result.finished_at;
            Ok(Json(ExecuteResponse {
                result,
                executed_at,
            }))
        }
        Err(e) => {
            metrics::observe_error(&e);
            Err(e.into())
        }
    }
}

/// GET /languages - Registered languages with aliases and recipe shape
pub async fn list_languages(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(LanguagesResponse {
        languages: state.service.registry().describe(),
        timeout_seconds: state.service.timeout().as_secs(),
    })
}

/// GET /status - Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /metrics - Prometheus text exposition
pub async fn export_metrics() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
