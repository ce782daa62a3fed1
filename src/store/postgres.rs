//! PostgreSQL store backed by sqlx.
//!
//! Transactions run at READ COMMITTED. Courier selection locks the chosen
//! row with `FOR UPDATE SKIP LOCKED`, so two concurrent assignments never
//! pick the same available courier: the second one skips the locked row and
//! takes the next candidate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use tracing::info;

use crate::models::courier::{Courier, CourierStatus, NewCourier, TransportType};
use crate::models::delivery::{Delivery, NewDelivery};
use crate::store::{CourierStore, DeliveryStore, Store, StoreError, StoreResult, Transaction};

const COURIER_COLUMNS: &str = "id, name, phone, status, transport_type, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` and applies the embedded migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(max_connections, "postgres store ready");

        Ok(store)
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn ping(&self) -> StoreResult<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

pub struct PgTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[derive(sqlx::FromRow)]
struct CourierRow {
    id: i64,
    name: String,
    phone: String,
    status: String,
    transport_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CourierRow> for Courier {
    type Error = StoreError;

    fn try_from(row: CourierRow) -> Result<Self, Self::Error> {
        let transport_type = row
            .transport_type
            .parse::<TransportType>()
            .map_err(|_| StoreError::UnknownTransportType(row.transport_type.clone()))?;
        let status = row
            .status
            .parse::<CourierStatus>()
            .map_err(|err| StoreError::Corrupt(err.to_string()))?;

        Ok(Courier {
            id: row.id,
            name: row.name,
            phone: row.phone,
            status,
            transport_type,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn unique_violation(err: sqlx::Error, message: impl FnOnce() -> String) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict(message())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl CourierStore for PgTransaction {
    async fn create_courier(
        &mut self,
        courier: NewCourier,
        now: DateTime<Utc>,
    ) -> StoreResult<Courier> {
        let sql = format!(
            "INSERT INTO couriers (name, phone, status, transport_type, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             RETURNING {COURIER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CourierRow>(&sql)
            .bind(&courier.name)
            .bind(&courier.phone)
            .bind(CourierStatus::Available.as_str())
            .bind(courier.transport_type.as_str())
            .bind(now)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|err| {
                unique_violation(err, || format!("phone {} already registered", courier.phone))
            })?;

        Courier::try_from(row)
    }

    async fn get_courier_by_id(&mut self, id: i64) -> StoreResult<Option<Courier>> {
        let sql = format!("SELECT {COURIER_COLUMNS} FROM couriers WHERE id = $1");
        sqlx::query_as::<_, CourierRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Courier::try_from)
            .transpose()
    }

    async fn list_couriers(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Courier>> {
        let sql = format!(
            "SELECT {COURIER_COLUMNS} FROM couriers ORDER BY id ASC LIMIT $1 OFFSET $2"
        );
        sqlx::query_as::<_, CourierRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *self.tx)
            .await?
            .into_iter()
            .map(Courier::try_from)
            .collect()
    }

    async fn courier_exists(&mut self, id: i64) -> StoreResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM couriers WHERE id = $1)")
                .bind(id)
                .fetch_one(&mut *self.tx)
                .await?;
        Ok(exists)
    }

    async fn update_courier(&mut self, courier: &Courier) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE couriers
            SET name = $2, phone = $3, status = $4, transport_type = $5, updated_at = $6
            WHERE id = $1
            ",
        )
        .bind(courier.id)
        .bind(&courier.name)
        .bind(&courier.phone)
        .bind(courier.status.as_str())
        .bind(courier.transport_type.as_str())
        .bind(courier.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, || format!("phone {} already registered", courier.phone))
        })?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_available_courier(&mut self) -> StoreResult<Option<Courier>> {
        // A correlated count instead of LEFT JOIN .. GROUP BY: row locks are
        // not allowed together with aggregation.
        let sql = format!(
            "SELECT {COURIER_COLUMNS}
             FROM couriers c
             WHERE c.status = 'available'
             ORDER BY (SELECT COUNT(*) FROM delivery d WHERE d.courier_id = c.id) ASC, c.id ASC
             LIMIT 1
             FOR UPDATE SKIP LOCKED"
        );
        sqlx::query_as::<_, CourierRow>(&sql)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Courier::try_from)
            .transpose()
    }

    async fn get_courier_id_by_order_id(&mut self, order_id: &str) -> StoreResult<Option<i64>> {
        let courier_id: Option<i64> =
            sqlx::query_scalar("SELECT courier_id FROM delivery WHERE order_id = $1")
                .bind(order_id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(courier_id)
    }

    async fn free_couriers_with_interval(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(
            r"
            UPDATE couriers c
            SET status = 'available', updated_at = $1
            WHERE c.status = 'busy'
              AND (
                  SELECT d.deadline
                  FROM delivery d
                  WHERE d.courier_id = c.id
                  ORDER BY d.assigned_at DESC, d.id DESC
                  LIMIT 1
              ) < $1
            ",
        )
        .bind(now)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DeliveryStore for PgTransaction {
    async fn create_delivery(&mut self, delivery: NewDelivery) -> StoreResult<Delivery> {
        sqlx::query_as::<_, Delivery>(
            r"
            INSERT INTO delivery (order_id, courier_id, assigned_at, deadline)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, courier_id, assigned_at, deadline
            ",
        )
        .bind(&delivery.order_id)
        .bind(delivery.courier_id)
        .bind(delivery.assigned_at)
        .bind(delivery.deadline)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| {
            unique_violation(err, || {
                format!("order {} already has a delivery", delivery.order_id)
            })
        })
    }

    async fn couriers_delivery(&mut self, order_id: &str) -> StoreResult<Option<Delivery>> {
        let delivery = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, order_id, courier_id, assigned_at, deadline
            FROM delivery
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(delivery)
    }

    async fn delete_delivery(&mut self, order_id: &str) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM delivery WHERE order_id = $1")
            .bind(order_id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn deliveries_for_courier(&mut self, courier_id: i64) -> StoreResult<Vec<Delivery>> {
        let deliveries = sqlx::query_as::<_, Delivery>(
            r"
            SELECT id, order_id, courier_id, assigned_at, deadline
            FROM delivery
            WHERE courier_id = $1
            ORDER BY assigned_at ASC, id ASC
            ",
        )
        .bind(courier_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(deliveries)
    }
}
