use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use polyrun_engine::ExecutionError;
use serde::Serialize;

/// Errors surfaced by the HTTP layer.
///
/// Validation problems are the caller's (400); everything else is ours (500).
#[derive(Debug)]
pub enum ApiError {
    Validation {
        message: String,
        supported: Vec<String>,
    },
    Execution {
        message: String,
        output: String,
    },
}

#[derive(Debug, Serialize)]
struct ValidationBody<'a> {
    error: &'a str,
    supported: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailureBody<'a> {
    success: bool,
    error: &'a str,
    error_output: &'a str,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Execution { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Validation { message, supported } => (
                status,
                Json(ValidationBody {
                    error: message,
                    supported,
                }),
            )
                .into_response(),
            Self::Execution { message, output } => (
                status,
                Json(FailureBody {
                    success: false,
                    error: message,
                    error_output: output,
                }),
            )
                .into_response(),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Validation { message, supported } => {
                Self::Validation { message, supported }
            }
            ExecutionError::Infrastructure { message, output } => {
                Self::Execution { message, output }
            }
            other @ (ExecutionError::Resource(_) | ExecutionError::Cancelled) => Self::Execution {
                message: other.to_string(),
                output: String::new(),
            },
        }
    }
}
