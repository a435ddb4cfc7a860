//! Error types for the HTTP layer.
//!
//! # Design
//! Every anticipated failure becomes a JSON body of the form
//! `{"error": "<message>"}`. Store failures forward the driver's message
//! verbatim. `Unhandled` is the escape hatch for failures no handler
//! anticipates: it renders as a bare 500 with an empty body.

use std::fmt::Display;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use todo_core::{PayloadError, StoreError};

/// Errors returned by request handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request body failed validation; nothing touched the store.
    #[error(transparent)]
    Validation(#[from] PayloadError),

    /// No todo with the requested id, or no route for the path.
    #[error("not found")]
    NotFound,

    /// A store operation failed; its transaction has been rolled back.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A failure the handler does not catch. No structured body.
    #[error("unhandled: {0}")]
    Unhandled(String),
}

impl ApiError {
    pub fn unhandled(err: impl Display) -> Self {
        Self::Unhandled(err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Unhandled(message) => {
                tracing::error!(error = %message, "unhandled request failure");
                return status.into_response();
            }
            Self::Store(err) => tracing::error!(error = %err, "store operation failed"),
            Self::Validation(_) | Self::NotFound => {
                tracing::debug!(status = status.as_u16(), error = %self, "request rejected")
            }
        }

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}

/// Fatal errors while bringing the server up or running it.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("store initialisation failed: {0}")]
    Store(#[from] StoreError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
