use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::assignment::{Assignment, Release};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/delivery/assign", post(assign))
        .route("/delivery/unassign", post(unassign))
        .route("/delivery/complete", post(complete))
}

#[derive(Deserialize)]
pub struct OrderRequest {
    #[serde(default)]
    pub order_id: String,
}

#[derive(Serialize)]
pub struct CompleteResponse {
    pub order_id: String,
    pub status: &'static str,
}

async fn assign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRequest>,
) -> Result<(StatusCode, Json<Assignment>), AppError> {
    let assignment = state.assignments.assign(&payload.order_id).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

async fn unassign(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRequest>,
) -> Result<Json<Release>, AppError> {
    Ok(Json(state.releases.unassign(&payload.order_id).await?))
}

async fn complete(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<OrderRequest>,
) -> Result<Json<CompleteResponse>, AppError> {
    state.releases.complete(&payload.order_id).await?;
    Ok(Json(CompleteResponse {
        order_id: payload.order_id,
        status: "completed",
    }))
}
