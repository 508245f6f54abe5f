//! HTTP surface for the parcel service.
//!
//! One router serves every deployment entry point; see [`router::build_router`].

pub mod handlers;
pub mod router;
pub mod state;

use crate::core::StoreError;
use crate::payment::PaymentError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

pub use router::build_router;
pub use state::AppState;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(rename = "receivedId", skip_serializing_if = "Option::is_none")]
    pub received_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{message}: {received_id:?}")]
    InvalidIdentifier {
        message: String,
        received_id: String,
    },
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Input(String),
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl WebError {
    pub fn invalid_identifier(message: impl Into<String>, received_id: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            message: message.into(),
            received_id: received_id.into(),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let mut received_id = None;
        let (status, message, code) = match self {
            WebError::Store(StoreError::Configuration(detail)) => {
                warn!(error = %detail, "store not configured");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "database not connected".to_string(),
                    "database_unavailable",
                )
            }
            WebError::Store(StoreError::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, msg, "validation_error")
            }
            WebError::Store(err) => {
                error!(error = %err, "store operation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database operation failed".to_string(),
                    "database_error",
                )
            }
            WebError::InvalidIdentifier {
                message,
                received_id: id,
            } => {
                received_id = Some(id);
                (StatusCode::BAD_REQUEST, message, "invalid_id")
            }
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, "not_found"),
            WebError::Input(msg) => (StatusCode::BAD_REQUEST, msg, "input_error"),
            WebError::Payment(PaymentError::NotConfigured(detail)) => {
                warn!(error = %detail, "payment provider not configured");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "payment provider not configured".to_string(),
                    "payment_unavailable",
                )
            }
            WebError::Payment(PaymentError::InvalidAmount(msg)) => {
                (StatusCode::BAD_REQUEST, msg, "invalid_amount")
            }
            WebError::Payment(PaymentError::Upstream(detail)) => {
                error!(error = %detail, "payment provider request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "payment provider request failed".to_string(),
                    "payment_error",
                )
            }
            WebError::Payment(PaymentError::InvalidSignature(detail)) => {
                warn!(error = %detail, "webhook signature rejected");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook signature verification failed".to_string(),
                    "invalid_signature",
                )
            }
        };

        let body = Json(ErrorResponse {
            error: message,
            code: code.to_string(),
            received_id,
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WebError>;
