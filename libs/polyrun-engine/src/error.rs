use thiserror::Error;

/// Failures that prevent a job from producing an `ExecutionResult`.
///
/// Compile errors, non-zero exits and timeouts are not errors: they are
/// results with `success = false`. Everything here is either the caller's
/// fault (`Validation`) or the host's (`Resource`, `Infrastructure`).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Missing fields, oversized source or unknown language. Raised before any
    /// filesystem or process activity.
    #[error("{message}")]
    Validation {
        message: String,
        supported: Vec<String>,
    },

    /// Workspace allocation or source write failed.
    #[error("workspace error: {0}")]
    Resource(String),

    /// Toolchain binary missing, or spawning/waiting on a process failed.
    #[error("{message}")]
    Infrastructure { message: String, output: String },

    /// The caller gave up on the job before it finished.
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutionError {
    pub fn validation(message: impl Into<String>, supported: Vec<String>) -> Self {
        Self::Validation {
            message: message.into(),
            supported,
        }
    }

    pub fn infrastructure(message: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
            output: output.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::Resource(_) => "resource_error",
            Self::Infrastructure { .. } => "infrastructure_error",
            Self::Cancelled => "cancelled",
        }
    }
}
