use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::assignment::AssignmentEngine;
use crate::engine::registry::CourierRegistry;
use crate::engine::release::ReleaseEngine;
use crate::engine::sweeper::ExpirySweeper;
use crate::models::order::OrderStatusChanged;
use crate::observability::metrics::Metrics;
use crate::store::{Store, TransactionRunner};
use crate::time::Clock;

pub struct AppState {
    pub runner: TransactionRunner,
    pub assignments: AssignmentEngine,
    pub releases: ReleaseEngine,
    pub sweeper: ExpirySweeper,
    pub couriers: CourierRegistry,
    pub order_events_tx: mpsc::Sender<OrderStatusChanged>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        order_queue_size: usize,
    ) -> (Self, mpsc::Receiver<OrderStatusChanged>) {
        let (order_events_tx, order_events_rx) = mpsc::channel(order_queue_size);
        let runner = TransactionRunner::new(store);
        let metrics = Metrics::new();

        (
            Self {
                assignments: AssignmentEngine::new(runner.clone(), clock.clone(), metrics.clone()),
                releases: ReleaseEngine::new(runner.clone(), clock.clone(), metrics.clone()),
                sweeper: ExpirySweeper::new(runner.clone(), clock.clone(), metrics.clone()),
                couriers: CourierRegistry::new(runner.clone(), clock),
                runner,
                order_events_tx,
                metrics,
            },
            order_events_rx,
        )
    }
}
