use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::observability::metrics::{outcome, Metrics};
use crate::store::{CourierStore, TransactionRunner};
use crate::time::Clock;

/// Releases busy couriers whose latest delivery is past its deadline.
#[derive(Clone)]
pub struct ExpirySweeper {
    runner: TransactionRunner,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl ExpirySweeper {
    pub fn new(runner: TransactionRunner, clock: Arc<dyn Clock>, metrics: Metrics) -> Self {
        Self {
            runner,
            clock,
            metrics,
        }
    }

    /// Runs a single sweep and returns how many couriers were freed.
    pub async fn free_couriers_with_interval(&self) -> Result<u64, AppError> {
        let start = Instant::now();
        let now = self.clock.now();

        let result = self
            .runner
            .run(move |tx| {
                Box::pin(async move {
                    let freed = tx.free_couriers_with_interval(now).await?;
                    Ok::<_, AppError>(freed)
                })
            })
            .await;

        self.metrics
            .observe_latency("sweep", start.elapsed().as_secs_f64());
        self.metrics
            .sweeps_total
            .with_label_values(&[outcome(&result)])
            .inc();
        if let Ok(freed) = result {
            self.metrics.couriers_freed_total.inc_by(freed);
        }

        result
    }

    /// Sweeps every `period` until `cancel` fires. A failed sweep is logged
    /// and retried on the next tick. Cancellation is only observed between
    /// ticks, so a sweep that has started always finishes.
    pub async fn check_free_couriers_with_interval(
        self,
        period: Duration,
        cancel: CancellationToken,
    ) {
        info!(interval_ms = period.as_millis() as u64, "expiry sweeper started");

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.free_couriers_with_interval().await {
                        Ok(0) => debug!("expiry sweep found nothing to free"),
                        Ok(freed) => info!(freed, "expiry sweep freed couriers"),
                        Err(err) => error!(error = %err, "expiry sweep failed"),
                    }
                }
            }
        }

        info!("expiry sweeper stopped");
    }
}
