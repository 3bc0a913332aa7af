//! HTTP error mapping.

use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use township_lifecycle::LifecycleError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Path segment is not a report id
    #[error("malformed report id: {0}")]
    MalformedId(String),

    /// Body is not JSON or does not match the request shape
    #[error(transparent)]
    Body(#[from] JsonRejection),
}

/// `Json` extractor whose rejection is an [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl ApiError {
    /// - Validation, bad body: 400
    /// - NotFound, malformed id: 404
    /// - TerminalState, InvalidTransition, AlreadyDecided, NotCommunityBacked: 409
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Lifecycle(LifecycleError::Validation { .. }) | Self::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Lifecycle(LifecycleError::NotFound(_)) | Self::MalformedId(_) => {
                StatusCode::NOT_FOUND
            }
            Self::Lifecycle(
                LifecycleError::TerminalState { .. }
                | LifecycleError::InvalidTransition { .. }
                | LifecycleError::AlreadyDecided { .. }
                | LifecycleError::NotCommunityBacked(_),
            ) => StatusCode::CONFLICT,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Lifecycle(e) => e.kind(),
            Self::MalformedId(_) => "not_found",
            Self::Body(_) => "validation",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Lifecycle(e) => e.user_message(),
            Self::MalformedId(_) => "This report could not be found".to_string(),
            Self::Body(rejection) => format!("Please check the request: {}", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.kind(),
            "message": self.user_message(),
        });
        (status, Json(body)).into_response()
    }
}
