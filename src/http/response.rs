//! Error responses.

use crate::error::DbError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// `{"error": {...}}` body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

pub(crate) fn status_for(err: &DbError) -> StatusCode {
    match err {
        DbError::NotFound { .. } | DbError::UnknownTable { .. } => StatusCode::NOT_FOUND,
        DbError::Conflict { .. } => StatusCode::CONFLICT,
        DbError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        DbError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        DbError::Connection { .. } | DbError::Timeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DbError::Schema { .. }
        | DbError::Migration { .. }
        | DbError::Database { .. }
        | DbError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind().to_string(),
                message: self.to_string(),
                suggestion: self.suggestion().map(str::to_string),
            },
        };
        (status, Json(body)).into_response()
    }
}
