use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use duplex_store::StoreError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Message must contain text or an image")]
    InvalidMessage,

    #[error("Missing or malformed x-user-id header")]
    MissingIdentity,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ServerError::InvalidMessage => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
            ServerError::MissingIdentity => (StatusCode::UNAUTHORIZED, self.to_string()),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            // Transient store failures surface as a generic retry signal;
            // details stay in the server log.
            ServerError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage temporarily unavailable, try again".to_string(),
            ),
            ServerError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = serde_json::json!({
            "error": message,
        });

        (status, axum::Json(body)).into_response()
    }
}
