use {
    axum::{
        Json,
        extract::rejection::{JsonRejection, PathRejection},
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::json,
    tracing::error,
};

use hotline_store::Error as StoreError;

/// Failure of an HTTP API call, rendered as `{"success": false, "message"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::Store(StoreError::InvalidUser(_)) => {
                StatusCode::BAD_REQUEST
            },
            Self::NotFound(_) | Self::Store(StoreError::UnknownUser(_)) => StatusCode::NOT_FOUND,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::Store(StoreError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "api request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}
