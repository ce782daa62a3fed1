use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Deserialize;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierProfile, NewCourier, TransportType};
use crate::models::delivery::Delivery;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/couriers", get(list_couriers).post(create_courier))
        .route("/couriers/:id", get(get_courier).put(update_courier))
        .route("/couriers/:id/deliveries", get(list_courier_deliveries))
}

#[derive(Deserialize)]
pub struct CreateCourierRequest {
    pub name: String,
    pub phone: String,
    pub transport_type: String,
}

#[derive(Deserialize)]
pub struct UpdateCourierRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub transport_type: Option<String>,
}

#[derive(Deserialize)]
pub struct ListCouriersQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn parse_transport_type(raw: &str) -> Result<TransportType, AppError> {
    raw.parse::<TransportType>().map_err(|_| {
        AppError::BadRequest(format!(
            "unknown transport_type: {raw}, expected car/scooter/on_foot"
        ))
    })
}

async fn create_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCourierRequest>,
) -> Result<(StatusCode, Json<Courier>), AppError> {
    let courier = NewCourier {
        transport_type: parse_transport_type(&payload.transport_type)?,
        name: payload.name,
        phone: payload.phone,
    };

    let created = state.couriers.register(courier).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn list_couriers(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListCouriersQuery>,
) -> Result<Json<Vec<Courier>>, AppError> {
    let couriers = state.couriers.list(query.limit, query.offset).await?;
    Ok(Json(couriers))
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Courier>, AppError> {
    Ok(Json(state.couriers.get(id).await?))
}

async fn update_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCourierRequest>,
) -> Result<Json<Courier>, AppError> {
    let profile = CourierProfile {
        name: payload.name,
        phone: payload.phone,
        transport_type: payload
            .transport_type
            .as_deref()
            .map(parse_transport_type)
            .transpose()?,
    };

    Ok(Json(state.couriers.update(id, profile).await?))
}

async fn list_courier_deliveries(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<Delivery>>, AppError> {
    Ok(Json(state.couriers.deliveries(id).await?))
}
