use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::conversions::ConversionsError;
use crate::models::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Method Not Allowed")]
    MethodNotAllowed,
    #[error("Server configuration error")]
    MissingAccessToken,
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] serde_json::Error),
    #[error("eventName is required")]
    MissingEventName,
    #[error(transparent)]
    Upstream(#[from] ConversionsError),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingAccessToken => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingEventName => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MethodNotAllowed => "method_not_allowed",
            Self::MissingAccessToken => "config_error",
            Self::InvalidBody(_) => "invalid_body",
            Self::MissingEventName => "missing_event_name",
            Self::Upstream(_) => "upstream_error",
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match &self {
            Self::MissingAccessToken => {
                tracing::error!("FB_CONVERSIONS_API_TOKEN not configured");
            }
            Self::Upstream(err) => {
                tracing::error!(
                    error = %err,
                    upstream_status = err.status(),
                    "error tracking conversion"
                );
            }
            _ => {
                tracing::warn!(code = self.code(), error = %self, "rejected conversion request");
            }
        }

        let body = ErrorResponse {
            success: false,
            code: self.code(),
            error: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
