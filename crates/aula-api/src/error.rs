//! API error type and its JSON `{error}` response.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use aula_core::{locale, ErrorResponse};

use crate::gemini::GenerationError;

pub const METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const INVALID_JSON_BODY: &str = "Invalid JSON body";
pub const QUERY_REQUIRED: &str = "Query is required";
pub const RATE_LIMITED: &str = "Rate limit exceeded";

#[derive(Debug)]
pub enum ApiError {
    /// 405
    MethodNotAllowed,
    /// 400, with the message shown to the caller.
    BadRequest(String),
    /// 500 when the model credential is missing.
    NotConfigured,
    /// 500 with the full message shown to the caller.
    Internal(String),
    /// 429
    TooManyRequests,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotConfigured | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::MethodNotAllowed => METHOD_NOT_ALLOWED.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
            ApiError::NotConfigured => locale::MISSING_API_KEY.to_string(),
            ApiError::TooManyRequests => RATE_LIMITED.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        ApiError::Internal(locale::internal_server_error(&err.to_string()))
    }
}
