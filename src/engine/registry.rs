use std::sync::Arc;

use tracing::info;

use crate::error::AppError;
use crate::models::courier::{Courier, CourierProfile, NewCourier};
use crate::models::delivery::Delivery;
use crate::store::{CourierStore, DeliveryStore, StoreError, TransactionRunner};
use crate::time::Clock;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;

/// Courier registration and profile management. Status is owned by the
/// engines and never changes here.
#[derive(Clone)]
pub struct CourierRegistry {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
}

fn require_non_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn map_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::Conflict(message) => AppError::Conflict(message),
        other => AppError::from(other),
    }
}

impl CourierRegistry {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>) -> Self {
        Self { runner, clock }
    }

    pub async fn register(&self, courier: NewCourier) -> Result<Courier, AppError> {
        require_non_blank("name", &courier.name)?;
        require_non_blank("phone", &courier.phone)?;

        let now = self.clock.now();
        let created = self
            .runner
            .run(move |tx| {
                Box::pin(async move {
                    let created = tx.create_courier(courier, now).await.map_err(map_conflict)?;
                    Ok::<_, AppError>(created)
                })
            })
            .await?;

        info!(
            courier_id = created.id,
            transport_type = %created.transport_type,
            "courier registered"
        );
        Ok(created)
    }

    pub async fn get(&self, id: i64) -> Result<Courier, AppError> {
        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    let courier = tx
                        .get_courier_by_id(id)
                        .await?
                        .ok_or(AppError::CourierNotFound(id))?;
                    Ok::<_, AppError>(courier)
                })
            })
            .await
    }

    pub async fn list(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<Courier>, AppError> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = offset.unwrap_or(0).max(0);

        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    let couriers = tx.list_couriers(limit, offset).await?;
                    Ok::<_, AppError>(couriers)
                })
            })
            .await
    }

    pub async fn update(&self, id: i64, profile: CourierProfile) -> Result<Courier, AppError> {
        if let Some(name) = &profile.name {
            require_non_blank("name", name)?;
        }
        if let Some(phone) = &profile.phone {
            require_non_blank("phone", phone)?;
        }

        let now = self.clock.now();
        let updated = self
            .runner
            .run(move |tx| {
                Box::pin(async move {
                    let mut courier = tx
                        .get_courier_by_id(id)
                        .await?
                        .ok_or(AppError::CourierNotFound(id))?;

                    if let Some(name) = profile.name {
                        courier.name = name;
                    }
                    if let Some(phone) = profile.phone {
                        courier.phone = phone;
                    }
                    if let Some(transport_type) = profile.transport_type {
                        courier.transport_type = transport_type;
                    }
                    courier.updated_at = now;

                    tx.update_courier(&courier).await.map_err(map_conflict)?;
                    Ok::<_, AppError>(courier)
                })
            })
            .await?;

        info!(courier_id = updated.id, "courier profile updated");
        Ok(updated)
    }

    /// Deliveries currently recorded against a courier, oldest first.
    pub async fn deliveries(&self, id: i64) -> Result<Vec<Delivery>, AppError> {
        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    if !tx.courier_exists(id).await? {
                        return Err(AppError::CourierNotFound(id));
                    }
                    let mut deliveries = tx.deliveries_for_courier(id).await?;
                    deliveries.sort_by_key(|delivery| (delivery.assigned_at, delivery.id));
                    Ok::<_, AppError>(deliveries)
                })
            })
            .await
    }
}
