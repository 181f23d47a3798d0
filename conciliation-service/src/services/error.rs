use crate::models::UnsafePayment;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConciliationError {
    #[error("{message}")]
    Validation {
        message: String,
        /// Offending document, when the failure is tied to one.
        document: Option<String>,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("Group {group_id} has payments allocated outside the group")]
    UnsafePayments {
        group_id: String,
        unsafe_payments: Vec<UnsafePayment>,
    },

    #[error("Document store error: {0}")]
    ExternalStore(#[source] anyhow::Error),
}

impl ConciliationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            document: None,
        }
    }

    pub fn invalid_document(document: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            document: Some(document.to_string()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Metric label for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound(_) => "not_found",
            Self::UnsafePayments { .. } => "conflict",
            Self::ExternalStore(_) => "external_store",
        }
    }
}

impl From<validator::ValidationErrors> for ConciliationError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::validation(err.to_string())
    }
}

impl IntoResponse for ConciliationError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation { message, document } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message, "document": document })),
            )
                .into_response(),
            Self::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            Self::UnsafePayments {
                group_id,
                unsafe_payments,
            } => (
                StatusCode::CONFLICT,
                Json(json!({
                    "error": format!(
                        "Group {} has payments allocated outside the group",
                        group_id
                    ),
                    "group_id": group_id,
                    "unsafe_payments": unsafe_payments,
                })),
            )
                .into_response(),
            Self::ExternalStore(err) => {
                tracing::error!(error = ?err, "Document store request failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({
                        "error": "Document store unavailable",
                        "retryable": true,
                    })),
                )
                    .into_response()
            }
        }
    }
}
