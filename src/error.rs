use crate::provider::ProviderError;
use crate::signature::SignatureError;
use crate::store::StoreError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{error, warn};

/// Failures surfaced to HTTP callers. Webhook processing failures never end up here; they are
/// logged by the intake worker instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(&'static str),
    #[error("{context}: {source}")]
    Provider {
        context: &'static str,
        #[source]
        source: ProviderError,
    },
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
    #[error("invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),
    #[error("webhook intake queue is closed")]
    IntakeClosed,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            AppError::Provider { context, source } => {
                error!(error=%source, "{context}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": context, "details": source.to_string() })),
                )
                    .into_response()
            }
            AppError::Store { context, source } => {
                error!(error=%source, "{context}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": context, "details": source.to_string() })),
                )
                    .into_response()
            }
            AppError::Signature(e) => {
                warn!(error=%e, "rejecting webhook delivery");
                (StatusCode::UNAUTHORIZED, "Invalid signature").into_response()
            }
            AppError::IntakeClosed => {
                error!("webhook intake queue is closed; asking provider to redeliver");
                (StatusCode::SERVICE_UNAVAILABLE, "Webhook intake unavailable").into_response()
            }
        }
    }
}
