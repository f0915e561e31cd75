use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Flat error taxonomy for the HTTP surface: client input errors map to 4xx,
/// upstream service failures to 502, everything else to a generic 500.
/// Nothing is retried; every failure is reported directly to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("missing or invalid authorization")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("upstream service error: {0}")]
    Upstream(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            error!("internal error: {:#}", e);
        }
        let status = self.status();
        // Internal errors get the generic message from Display, not the cause chain
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::BadRequest("title is required".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::NotFound("document").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Upstream("speech api unreachable".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn internal_errors_are_generic() {
        let err = ApiError::Internal(anyhow::anyhow!("connection pool exhausted"));
        assert_eq!(err.to_string(), "internal server error");
    }
}
