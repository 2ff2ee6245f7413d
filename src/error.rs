//! Error handling for the inspection backend

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::ResponseCode;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Entity not found (by id or composite key)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing mandatory fields
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Semantic validation failure
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage failure surfaced with a fixed per-operation code.
    /// The original cause is logged at the point of conversion and
    /// deliberately dropped from the client-visible payload.
    #[error("Operation failed: {}", .0.message())]
    Operation(ResponseCode),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Response code the HTTP envelope should carry for this error.
    pub fn response_code(&self) -> ResponseCode {
        match self {
            Error::NotFound(_) => ResponseCode::NotFound,
            Error::BadRequest(_) => ResponseCode::BadRequest,
            Error::Validation(_) => ResponseCode::ValidationFailed,
            Error::Operation(code) => *code,
            Error::Serialization(_) | Error::Io(_) | Error::Sqlx(_) | Error::Internal(_) => {
                ResponseCode::InternalServerError
            }
        }
    }

    /// Client-visible description. Storage and internal errors collapse
    /// to the fixed message of their response code.
    pub fn description(&self) -> String {
        match self {
            Error::NotFound(msg) | Error::BadRequest(msg) | Error::Validation(msg) => msg.clone(),
            other => other.response_code().message().to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let code = self.response_code();
        let status = code.http_status();
        let description = self.description();

        tracing::error!(
            status = %status,
            response_code = code.code(),
            error = %self,
            "Request error"
        );

        let body = Json(json!({
            "responseCode": code.code(),
            "responseDescription": description,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_4001() {
        let err = Error::NotFound("missing".to_string());
        assert_eq!(err.response_code().code(), "4001");
        assert_eq!(err.response_code().http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.description(), "missing");
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err = Error::Validation("bad field".to_string());
        assert_eq!(err.response_code().code(), "4003");
        assert_eq!(
            err.response_code().http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_operation_error_hides_detail() {
        let err = Error::Operation(ResponseCode::TransformerNotCreated);
        assert_eq!(err.response_code().code(), "5000");
        assert_eq!(
            err.description(),
            "Transformer is partially created or not created"
        );
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = Error::Internal("connection refused to 10.0.0.1".to_string());
        assert_eq!(err.description(), "Internal Server Error");
    }
}
