//! Error types for the HTTP ID service.
//!
//! [`ServiceError`] captures everything a request can fail with and maps each
//! case onto an HTTP status code, so handlers can simply return
//! `Result<_, ServiceError>`.
//!
//! ## Error Cases
//! - `ChannelError`: An internal communication failure between the handler and
//!   a worker.
//! - `Dispenser`: Issuing or inspecting failed inside `rangeid`.
//! - `ServiceShutdown`: A request arrived while the service was shutting down.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Unified error type for the ID service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Internal channel send/receive failure (e.g., a worker went away).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The worker's dispenser failed.
    #[error("ID error: {0}")]
    Dispenser(#[from] rangeid::Error),

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl ServiceError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Dispenser(rangeid::Error::PoolExhausted { .. }) | Self::ServiceShutdown => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::ChannelError { .. } | Self::Dispenser(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        #[cfg(feature = "tracing")]
        tracing::warn!("request failed: {self}");

        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
