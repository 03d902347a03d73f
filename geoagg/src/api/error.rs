//! HTTP mapping of [`crate::Error`].

use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Body of every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidParameter { .. } | Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::BackendUnavailable(_) | Error::Http(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Toml(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        metrics::counter!("geoagg_request_errors_total", "kind" => self.kind()).increment(1);
        if self.is_client_error() {
            tracing::debug!(kind = self.kind(), "{}", self);
        } else {
            tracing::error!(kind = self.kind(), "{}", self);
        }

        let body = ErrorBody {
            status: status.as_u16(),
            message: self.to_string(),
            error: self.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}
