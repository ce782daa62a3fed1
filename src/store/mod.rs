//! Persistence contracts for couriers and deliveries.
//!
//! Every read and write goes through a [`Transaction`] obtained from a
//! [`Store`]. Engines never hold a transaction directly; they hand a unit of
//! work to the [`TransactionRunner`], which commits when the work returns
//! `Ok` and rolls back otherwise. A transaction that is dropped without being
//! committed (for example because the request future was cancelled) rolls
//! back as well.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::warn;

use crate::error::AppError;
use crate::models::courier::{Courier, NewCourier};
use crate::models::delivery::{Delivery, NewDelivery};

pub mod memory;
pub mod postgres;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("unknown transport type stored: {0}")]
    UnknownTransportType(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

#[async_trait]
pub trait CourierStore: Send {
    async fn create_courier(
        &mut self,
        courier: NewCourier,
        now: DateTime<Utc>,
    ) -> StoreResult<Courier>;

    async fn get_courier_by_id(&mut self, id: i64) -> StoreResult<Option<Courier>>;

    /// Couriers ordered by id.
    async fn list_couriers(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Courier>>;

    async fn courier_exists(&mut self, id: i64) -> StoreResult<bool>;

    /// Persists every mutable column of `courier`. Fails with
    /// [`StoreError::NotFound`] if the row is gone and
    /// [`StoreError::Conflict`] if the phone collides with another courier.
    async fn update_courier(&mut self, courier: &Courier) -> StoreResult<()>;

    /// The available courier with the fewest delivery rows, ties broken by
    /// the lowest id.
    async fn find_available_courier(&mut self) -> StoreResult<Option<Courier>>;

    async fn get_courier_id_by_order_id(&mut self, order_id: &str) -> StoreResult<Option<i64>>;

    /// Frees every busy courier whose most recent delivery (by
    /// `assigned_at`) has a deadline strictly before `now`. Returns the
    /// number of couriers freed.
    async fn free_couriers_with_interval(&mut self, now: DateTime<Utc>) -> StoreResult<u64>;
}

#[async_trait]
pub trait DeliveryStore: Send {
    /// Fails with [`StoreError::Conflict`] when a row for the same order id
    /// already exists.
    async fn create_delivery(&mut self, delivery: NewDelivery) -> StoreResult<Delivery>;

    async fn couriers_delivery(&mut self, order_id: &str) -> StoreResult<Option<Delivery>>;

    /// Fails with [`StoreError::NotFound`] when no row was deleted.
    async fn delete_delivery(&mut self, order_id: &str) -> StoreResult<()>;

    async fn deliveries_for_courier(&mut self, courier_id: i64) -> StoreResult<Vec<Delivery>>;
}

#[async_trait]
pub trait Transaction: CourierStore + DeliveryStore + Send {
    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// Unit of work executed by [`TransactionRunner::run`].
pub type TxFuture<'t, T> = BoxFuture<'t, Result<T, AppError>>;

#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn Store>,
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub async fn run<T, F>(&self, work: F) -> Result<T, AppError>
    where
        T: Send,
        F: for<'t> FnOnce(&'t mut Box<dyn Transaction>) -> TxFuture<'t, T> + Send,
    {
        let mut tx = self.store.begin().await?;

        match work(&mut tx).await {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "transaction rollback failed");
                }
                Err(err)
            }
        }
    }
}
