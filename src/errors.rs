use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::normalize::NormalizeError;
use crate::providers::ProviderError;

/// Centralized error type for the API surface. Each variant maps to one
/// branch of the response taxonomy: 400 input, 401 identity, 404 domain,
/// 422 shape, upstream status for provider failures, 500 otherwise.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Shape(#[from] NormalizeError),

    #[error(transparent)]
    Upstream(#[from] ProviderError),

    #[error("Server {0} not configured")]
    MissingApiKey(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// JSON error body: `error` always, `snippet` for shape failures,
/// `modelTried` for upstream failures.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(rename = "modelTried", skip_serializing_if = "Option::is_none")]
    pub model_tried: Option<String>,
}

impl ErrorBody {
    fn new(error: String) -> Self {
        Self {
            error,
            snippet: None,
            model_tried: None,
        }
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Shape(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Upstream(err) => err
                .status
                .and_then(|status| StatusCode::from_u16(status).ok())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ApiError::MissingApiKey(_) | ApiError::Database(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            ApiError::Shape(err) => ErrorBody {
                error: err.message.clone(),
                snippet: Some(err.snippet.clone()),
                model_tried: None,
            },
            ApiError::Upstream(err) => ErrorBody {
                error: self.to_string(),
                snippet: None,
                model_tried: (!err.model.is_empty()).then(|| err.model.clone()),
            },
            // Exception detail leaves the process only in debug builds.
            ApiError::Database(err) => ErrorBody::new(if cfg!(debug_assertions) {
                format!("Database error: {err}")
            } else {
                "Database operation failed. Please try again.".to_string()
            }),
            ApiError::Internal(message) => ErrorBody::new(if cfg!(debug_assertions) {
                format!("Internal server error: {message}")
            } else {
                "An internal error occurred. Please try again.".to_string()
            }),
            other => ErrorBody::new(other.to_string()),
        }
    }

    fn log(&self) {
        match self {
            ApiError::Validation(message) => {
                warn!(error = %message, "Request validation failed");
            }
            ApiError::Unauthorized => {
                warn!("Request carried no user id or anonymous id");
            }
            ApiError::NotFound(message) => {
                info!(error = %message, "Resource not found");
            }
            ApiError::Shape(err) => {
                warn!(
                    error = %err.message,
                    snippet = %err.snippet,
                    "Model response failed shape validation"
                );
            }
            ApiError::Upstream(err) => {
                error!(
                    provider = err.provider,
                    model = %err.model,
                    status = ?err.status,
                    error = %err.message,
                    "All model attempts failed"
                );
            }
            ApiError::MissingApiKey(variable) => {
                error!(variable, "Provider API key missing from environment");
            }
            ApiError::Database(err) => {
                error!(error = %err, "Database operation failed");
            }
            ApiError::Internal(message) => {
                error!(error = %message, "Unexpected internal error");
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::NormalizeError;
    use crate::providers::ProviderError;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ApiError::Validation("Missing required fields".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::NotFound("Course not found".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::MissingApiKey("PPLX_API_KEY").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn shape_errors_are_422_with_snippet() {
        let err = ApiError::Shape(NormalizeError {
            message: "Invalid quiz format".to_string(),
            snippet: "not json".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = err.body();
        assert_eq!(body.error, "Invalid quiz format");
        assert_eq!(body.snippet.as_deref(), Some("not json"));
    }

    #[test]
    fn upstream_errors_propagate_status_and_model() {
        let err = ApiError::Upstream(ProviderError {
            provider: "Perplexity",
            model: "sonar-pro".to_string(),
            status: Some(429),
            message: "rate limited".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        let body = err.body();
        assert_eq!(body.model_tried.as_deref(), Some("sonar-pro"));
        assert!(body.error.contains("Perplexity API error"));

        let err = ApiError::Upstream(ProviderError {
            provider: "Perplexity",
            model: "sonar-pro".to_string(),
            status: None,
            message: "connection reset".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_key_message_names_the_variable() {
        let err = ApiError::MissingApiKey("PPLX_API_KEY");
        assert_eq!(err.to_string(), "Server PPLX_API_KEY not configured");
    }
}
