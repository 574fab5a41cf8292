//! Error taxonomy shared by the HTTP handlers.
//!
//! Every domain failure reaches the client as a JSON body with a stable
//! machine-readable `code` and a human-readable `error` message.

use std::time::Duration;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::compiler::CompileFailure;
use crate::llm::ProviderError;

/// Errors surfaced by the conversion and PDF endpoints.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Bad client input (empty text, oversized LaTeX, ...).
    #[error("{0}")]
    Validation(String),

    /// No credential for the configured AI provider.
    #[error("AI provider not configured: {0}")]
    ProviderNotConfigured(String),

    /// The AI provider failed or answered with something unusable.
    #[error("AI provider error: {0}")]
    Provider(String),

    /// The AI provider did not answer in time.
    #[error("AI provider did not respond within {}s", .0.as_secs())]
    ProviderTimeout(Duration),

    /// The LaTeX compiler failed and no fallback was allowed.
    #[error("LaTeX compilation failed: {message}")]
    Compilation {
        /// Short summary (exit status, timeout, missing output).
        message: String,
        /// Captured compiler output.
        diagnostics: String,
    },

    /// The whole request outlived the server's request timeout.
    #[error("Request did not complete within {}s", .0.as_secs())]
    RequestTimeout(Duration),

    /// Unknown or expired artifact identifier.
    #[error("Artifact '{0}' not found or expired")]
    NotFound(String),

    /// Anything else (I/O on the work directory, task join failures).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body returned for every [`AppError`].
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

impl AppError {
    /// Stable error code for clients.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::ProviderNotConfigured(_) => "PROVIDER_NOT_CONFIGURED",
            Self::Provider(_) => "PROVIDER_ERROR",
            Self::ProviderTimeout(_) => "PROVIDER_TIMEOUT",
            Self::Compilation { .. } => "COMPILATION_ERROR",
            Self::RequestTimeout(_) => "REQUEST_TIMEOUT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::ProviderNotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Provider(_) => StatusCode::BAD_GATEWAY,
            Self::ProviderTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Compilation { .. } | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RequestTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let diagnostics = match self {
            Self::Compilation { diagnostics, .. } if !diagnostics.is_empty() => {
                Some(diagnostics.clone())
            }
            _ => None,
        };
        ErrorBody {
            code: self.code(),
            error: self.to_string(),
            diagnostics,
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured(msg) => Self::ProviderNotConfigured(msg),
            other => Self::Provider(other.to_string()),
        }
    }
}

impl From<CompileFailure> for AppError {
    fn from(err: CompileFailure) -> Self {
        match err {
            CompileFailure::Io(e) => Self::Internal(format!("compilation work directory: {e}")),
            other => Self::Compilation {
                diagnostics: other.diagnostics().unwrap_or_default().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ProviderTimeout(Duration::from_secs(30)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(AppError::Provider("x".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::NotFound("id".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::ProviderNotConfigured("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_request_timeout_body() {
        let err = AppError::RequestTimeout(Duration::from_secs(120));
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "REQUEST_TIMEOUT");
        assert_eq!(body["error"], "Request did not complete within 120s");
    }

    #[test]
    fn test_compilation_body_carries_diagnostics() {
        let err = AppError::Compilation {
            message: "pdflatex exited with status 1".into(),
            diagnostics: "! Undefined control sequence.".into(),
        };
        let body = serde_json::to_value(err.body()).unwrap();
        assert_eq!(body["code"], "COMPILATION_ERROR");
        assert_eq!(body["diagnostics"], "! Undefined control sequence.");
    }

    #[test]
    fn test_body_omits_empty_diagnostics() {
        let body = serde_json::to_value(AppError::NotFound("abc".into()).body()).unwrap();
        assert_eq!(body["code"], "NOT_FOUND");
        assert!(body.get("diagnostics").is_none());
    }

    #[test]
    fn test_provider_error_conversion() {
        let err: AppError = ProviderError::NotConfigured("API_KEY missing".into()).into();
        assert_eq!(err.code(), "PROVIDER_NOT_CONFIGURED");
        let err: AppError = ProviderError::Empty.into();
        assert_eq!(err.code(), "PROVIDER_ERROR");
    }

    #[test]
    fn test_compile_failure_conversion() {
        let err: AppError = CompileFailure::Failed {
            exit_code: Some(1),
            diagnostics: "! Missing $ inserted.".into(),
        }
        .into();
        assert_eq!(err.code(), "COMPILATION_ERROR");
        assert_eq!(err.body().diagnostics.as_deref(), Some("! Missing $ inserted."));

        let err: AppError = CompileFailure::Unavailable.into();
        assert_eq!(err.code(), "COMPILATION_ERROR");
        assert!(err.body().diagnostics.is_none());
    }
}
