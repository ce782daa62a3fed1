use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use crate::engine::calculator::DeliveryCalculator;
use crate::error::AppError;
use crate::models::assignment::Assignment;
use crate::models::delivery::NewDelivery;
use crate::observability::metrics::{outcome, Metrics};
use crate::store::{CourierStore, DeliveryStore, StoreError, TransactionRunner};
use crate::time::Clock;

/// Binds orders to the least-loaded available courier.
#[derive(Clone)]
pub struct AssignmentEngine {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl AssignmentEngine {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            runner,
            clock,
            metrics,
        }
    }

    /// Assigns `order_id` to an available courier and marks that courier
    /// busy. Selection, delivery creation and the status flip commit together
    /// or not at all.
    pub async fn assign(&self, order_id: &str) -> Result<Assignment, AppError> {
        if order_id.is_empty() {
            return Err(AppError::NoOrderId);
        }

        let start = Instant::now();
        let result = self.assign_in_tx(order_id.to_string()).await;

        self.metrics
            .observe_latency("assign", start.elapsed().as_secs_f64());
        self.metrics
            .assignments_total
            .with_label_values(&[outcome(&result)])
            .inc();

        match &result {
            Ok(assignment) => info!(
                order_id = %assignment.order_id,
                courier_id = assignment.courier_id,
                transport_type = %assignment.transport_type,
                deadline = %assignment.delivery_deadline,
                "order assigned"
            ),
            Err(err) => warn!(order_id, error = %err, "order assignment failed"),
        }

        result
    }

    async fn assign_in_tx(&self, order_id: String) -> Result<Assignment, AppError> {
        let clock = self.clock.clone();

        self.runner
            .run(move |tx| {
                Box::pin(async move {
                    let mut courier = tx
                        .find_available_courier()
                        .await?
                        .ok_or(AppError::CouriersBusy)?;

                    // Unknown stored transport types already failed when the row was decoded.
                    let calculator = DeliveryCalculator::from(courier.transport_type);

                    let now = clock.now();
                    let deadline = calculator.deadline_from(now);

                    tx.create_delivery(NewDelivery {
                        order_id: order_id.clone(),
                        courier_id: courier.id,
                        assigned_at: now,
                        deadline,
                    })
                    .await
                    .map_err(|err| match err {
                        StoreError::Conflict(_) => AppError::OrderIdExists(order_id.clone()),
                        other => AppError::from(other),
                    })?;

                    courier.occupy(now)?;
                    tx.update_courier(&courier).await?;

                    Ok::<_, AppError>(Assignment {
                        courier_id: courier.id,
                        order_id,
                        transport_type: calculator.transport_type(),
                        delivery_deadline: deadline,
                    })
                })
            })
            .await
    }
}
