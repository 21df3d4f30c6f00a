use crate::application::IngestError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Validation(_) => StatusCode::BAD_REQUEST,
            IngestError::ProductNotFound(_) => StatusCode::NOT_FOUND,
            IngestError::Conflict(_) => StatusCode::CONFLICT,
            IngestError::Processing(_) | IngestError::Upload { .. } => StatusCode::BAD_GATEWAY,
            IngestError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Persistence(_) | IngestError::Staging(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, status = status.as_u16(), "Request failed");
        } else {
            warn!(error = %self, status = status.as_u16(), "Request rejected");
        }
        let body = ErrorBody {
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
