use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::order::{OrderStatus, OrderStatusChanged};
use crate::state::AppState;

pub async fn enqueue_order_event(
    state: &AppState,
    event: OrderStatusChanged,
) -> Result<(), AppError> {
    // Counted before the send so the consumer's decrement never runs first.
    state.metrics.order_events_in_queue.inc();

    if let Err(err) = state.order_events_tx.send(event).await {
        state.metrics.order_events_in_queue.dec();
        return Err(AppError::Internal(format!(
            "order event queue send failed: {err}"
        )));
    }
    Ok(())
}

/// Applies order status changes to couriers until every sender is dropped
/// or `cancel` fires. A failing event is logged and skipped.
pub async fn run_order_consumer(
    state: Arc<AppState>,
    mut order_events_rx: mpsc::Receiver<OrderStatusChanged>,
    cancel: CancellationToken,
) {
    info!("order event consumer started");

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = order_events_rx.recv() => match event {
                Some(event) => event,
                None => {
                    warn!("order event consumer stopped: queue channel closed");
                    return;
                }
            },
        };

        state.metrics.order_events_in_queue.dec();

        if let Err(err) = handle_order_event(&state, &event).await {
            error!(
                order_id = %event.order_id,
                status = ?event.status,
                error = %err,
                "failed to apply order status change"
            );
        }
    }

    info!("order event consumer stopped");
}

pub async fn handle_order_event(
    state: &AppState,
    event: &OrderStatusChanged,
) -> Result<(), AppError> {
    match &event.status {
        OrderStatus::Created => state.assignments.assign(&event.order_id).await.map(|_| ()),
        OrderStatus::Cancelled => state.releases.unassign(&event.order_id).await.map(|_| ()),
        OrderStatus::Completed => state.releases.complete(&event.order_id).await,
        OrderStatus::Other(status) => {
            debug!(order_id = %event.order_id, status = %status, "ignoring order status");
            Ok(())
        }
    }
}
