use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::courier::CourierStatus;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("order id is required")]
    NoOrderId,

    #[error("all couriers are busy")]
    CouriersBusy,

    #[error("unknown transport type: {0}")]
    UnknownTransportType(String),

    #[error("order {0} is already assigned")]
    OrderIdExists(String),

    #[error("no delivery found for order {0}")]
    OrderIdNotFound(String),

    #[error("no courier found for order {0}")]
    OrderNotFound(String),

    #[error("courier {0} not found")]
    CourierNotFound(i64),

    #[error("courier cannot move from {from} to {to}")]
    InvalidTransition {
        from: CourierStatus,
        to: CourierStatus,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UnknownTransportType(raw) => AppError::UnknownTransportType(raw),
            other => AppError::Storage(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NoOrderId | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::OrderIdNotFound(_)
            | AppError::OrderNotFound(_)
            | AppError::CourierNotFound(_) => StatusCode::NOT_FOUND,
            AppError::OrderIdExists(_) | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::CouriersBusy => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UnknownTransportType(_)
            | AppError::InvalidTransition { .. }
            | AppError::Storage(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}
