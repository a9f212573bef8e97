//! Error types for the webhook receiver

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use satis_hook_build::BuildError;
use thiserror::Error;

/// Why a webhook request was not turned into a successful build
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Wrong event type or missing signature header
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),

    /// The body could not be read to the end
    #[error("Failed to read request body: {0}")]
    ReadBody(String),

    /// The body is longer than the configured limit
    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    /// The body does not match the signature header
    #[error("Signature mismatch")]
    SignatureMismatch,

    /// The body is not a push event
    #[error("Malformed payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// The triggered build failed
    #[error("Build failed: {0}")]
    Build(#[from] BuildError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for webhook handling
pub type Result<T> = std::result::Result<T, WebhookError>;

impl WebhookError {
    /// HTTP status reported for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Payload(_) => StatusCode::BAD_REQUEST,
            Self::SignatureMismatch => StatusCode::NOT_ACCEPTABLE,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Build(e) if e.is_busy() || e.is_shutdown() => StatusCode::SERVICE_UNAVAILABLE,
            Self::ReadBody(_) | Self::Build(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
