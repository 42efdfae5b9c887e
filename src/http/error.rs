//! HTTP-facing conversion of `crate::error::Error` into the uniform JSON
//! envelope `{error, message, details?}` (§4.10).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::{Code, Error};

pub struct ApiError {
    status: StatusCode,
    code: Code,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: Code::Unauthorized,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

fn status_for(code: Code) -> StatusCode {
    match code {
        Code::ValidationFailed | Code::InvalidJson | Code::UniqueViolation | Code::FkViolation | Code::CheckViolation => {
            StatusCode::BAD_REQUEST
        }
        Code::UnknownColumn => StatusCode::BAD_REQUEST,
        Code::RlsDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::Unauthorized => StatusCode::UNAUTHORIZED,
        Code::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        // Conflicts (duplicate email, etc.) surface as 409, distinct from a
        // bare unique-constraint violation at the store layer.
        let status = if matches!(e, Error::Conflict(_)) {
            StatusCode::CONFLICT
        } else {
            status_for(e.code())
        };
        Self {
            status,
            code: e.code(),
            message: e.to_string(),
            details: None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: &'a Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code.as_str(),
            message: &self.message,
            details: &self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Extension trait mirroring the teacher's `ResultExt`, adapted to the
/// core's typed `Error` instead of ad-hoc string contexts.
pub trait ResultExt<T> {
    fn api_err(self) -> Result<T, ApiError>;
}

impl<T> ResultExt<T> for Result<T, Error> {
    fn api_err(self) -> Result<T, ApiError> {
        self.map_err(ApiError::from)
    }
}
