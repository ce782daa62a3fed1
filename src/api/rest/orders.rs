use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;

use crate::engine::consumer::enqueue_order_event;
use crate::error::AppError;
use crate::models::order::OrderStatusChanged;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/orders/events", post(publish_order_event))
}

async fn publish_order_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderStatusChanged>,
) -> Result<StatusCode, AppError> {
    if payload.order_id.is_empty() {
        return Err(AppError::NoOrderId);
    }

    enqueue_order_event(&state, payload).await?;
    Ok(StatusCode::ACCEPTED)
}
