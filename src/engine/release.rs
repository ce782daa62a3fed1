use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::error::AppError;
use crate::models::assignment::{Release, ReleaseStatus};
use crate::observability::metrics::{outcome, Metrics};
use crate::store::{CourierStore, DeliveryStore, StoreError, TransactionRunner};
use crate::time::Clock;

/// Frees couriers when their order is unassigned or completed.
#[derive(Clone)]
pub struct ReleaseEngine {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl ReleaseEngine {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            runner,
            clock,
            metrics,
        }
    }

    /// Deletes the delivery for `order_id` and makes its courier available
    /// again, atomically.
    pub async fn unassign(&self, order_id: &str) -> Result<Release, AppError> {
        if order_id.is_empty() {
            return Err(AppError::NoOrderId);
        }

        let start = Instant::now();
        let result = self.unassign_in_tx(order_id.to_string()).await;
        self.record("unassign", start, &result);

        match &result {
            Ok(release) => info!(
                order_id = %release.order_id,
                courier_id = release.courier_id,
                "order unassigned"
            ),
            Err(err) => warn!(order_id, error = %err, "order unassign failed"),
        }

        result
    }

    /// Makes the courier owning `order_id` available. The delivery row is
    /// kept.
    // FIXME: the kept row stays the courier's latest delivery, so the sweep
    // keys off a finished order until the courier is assigned again.
    pub async fn complete(&self, order_id: &str) -> Result<(), AppError> {
        if order_id.is_empty() {
            return Err(AppError::NoOrderId);
        }

        let start = Instant::now();
        let result = self.complete_in_tx(order_id.to_string()).await;
        self.record("complete", start, &result);

        match &result {
            Ok(courier_id) => info!(order_id, courier_id, "order completed"),
            Err(err) => warn!(order_id, error = %err, "order completion failed"),
        }

        result.map(|_| ())
    }

    fn record<T>(&self, operation: &str, start: Instant, result: &Result<T, AppError>) {
        self.metrics
            .observe_latency(operation, start.elapsed().as_secs_f64());
        self.metrics
            .releases_total
            .with_label_values(&[operation, outcome(result)])
            .inc();
    }

    async fn unassign_in_tx(&self, order_id: String) -> Result<Release, AppError> {
        let clock = self.clock.clone();

        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    let delivery = tx
                        .couriers_delivery(&order_id)
                        .await?
                        .ok_or_else(|| AppError::OrderIdNotFound(order_id.clone()))?;

                    tx.delete_delivery(&order_id)
                        .await
                        .map_err(|err| match err {
                            StoreError::NotFound => AppError::OrderIdNotFound(order_id.clone()),
                            other => AppError::from(other),
                        })?;

                    let mut courier = tx
                        .get_courier_by_id(delivery.courier_id)
                        .await?
                        .ok_or(AppError::CourierNotFound(delivery.courier_id))?;
                    courier.release(clock.now());
                    tx.update_courier(&courier).await?;

                    Ok::<_, AppError>(Release {
                        courier_id: courier.id,
                        order_id,
                        status: ReleaseStatus::Unassigned,
                    })
                })
            })
            .await
    }

    async fn complete_in_tx(&self, order_id: String) -> Result<i64, AppError> {
        let clock = self.clock.clone();

        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    let courier_id = tx
                        .get_courier_id_by_order_id(&order_id)
                        .await?
                        .ok_or_else(|| AppError::OrderNotFound(order_id.clone()))?;

                    let mut courier = tx
                        .get_courier_by_id(courier_id)
                        .await?
                        .ok_or_else(|| AppError::OrderNotFound(order_id.clone()))?;
                    courier.release(clock.now());
                    tx.update_courier(&courier).await?;

                    Ok::<_, AppError>(courier.id)
                })
            })
            .await
    }
}
