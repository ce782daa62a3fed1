//! PostgreSQL store tests.
//!
//! Each test creates its own database next to the one named by
//! `DATABASE_URL`, applies the migrations and drops it again. Without
//! `DATABASE_URL` the tests return early.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use courier_dispatch::error::AppError;
use courier_dispatch::models::courier::{Courier, CourierStatus, NewCourier, TransportType};
use courier_dispatch::models::delivery::NewDelivery;
use courier_dispatch::state::AppState;
use courier_dispatch::store::postgres::PgStore;
use courier_dispatch::store::{CourierStore, DeliveryStore, Store, StoreError, Transaction};
use courier_dispatch::time::ManualClock;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

static NEXT_DATABASE: AtomicUsize = AtomicUsize::new(0);

struct TestDatabase {
    store: PgStore,
    admin: PgPool,
    name: String,
}

impl TestDatabase {
    async fn create() -> Option<Self> {
        let Ok(database_url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping postgres store test");
            return None;
        };
        let options: PgConnectOptions = database_url.parse().expect("valid DATABASE_URL");

        let admin = PgPoolOptions::new()
            .max_connections(2)
            .connect_with(options.clone().database("postgres"))
            .await
            .expect("connect to admin database");

        let name = format!(
            "courier_dispatch_test_{}_{}",
            std::process::id(),
            NEXT_DATABASE.fetch_add(1, Ordering::SeqCst)
        );
        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{name}\" WITH (FORCE)"))
            .execute(&admin)
            .await
            .expect("drop stale test database");
        sqlx::query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&admin)
            .await
            .expect("create test database");

        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect_with(options.database(&name))
            .await
            .expect("connect to test database");
        let store = PgStore::new(pool);
        store.migrate().await.expect("apply migrations");

        Some(Self { store, admin, name })
    }

    async fn teardown(self) {
        self.store.pool().close().await;
        sqlx::query(&format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE)", self.name))
            .execute(&self.admin)
            .await
            .expect("drop test database");
    }
}

async fn add_courier(
    tx: &mut Box<dyn Transaction>,
    phone: &str,
    status: CourierStatus,
    now: DateTime<Utc>,
) -> Courier {
    let mut courier = tx
        .create_courier(
            NewCourier {
                name: format!("courier {phone}"),
                phone: phone.to_string(),
                transport_type: TransportType::Car,
            },
            now,
        )
        .await
        .unwrap();
    if status == CourierStatus::Busy {
        courier.occupy(now).unwrap();
        tx.update_courier(&courier).await.unwrap();
    }
    courier
}

async fn add_delivery(
    tx: &mut Box<dyn Transaction>,
    order_id: &str,
    courier_id: i64,
    assigned_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
) {
    tx.create_delivery(NewDelivery {
        order_id: order_id.to_string(),
        courier_id,
        assigned_at,
        deadline,
    })
    .await
    .unwrap();
}

async fn status_of(tx: &mut Box<dyn Transaction>, id: i64) -> CourierStatus {
    tx.get_courier_by_id(id).await.unwrap().unwrap().status
}

#[tokio::test]
async fn selection_prefers_least_loaded_then_lowest_id() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let now = Utc::now();
    let deadline = now + Duration::minutes(5);

    let mut tx = db.store.begin().await.unwrap();
    let a = add_courier(&mut tx, "+100", CourierStatus::Available, now).await;
    let b = add_courier(&mut tx, "+101", CourierStatus::Available, now).await;
    let c = add_courier(&mut tx, "+102", CourierStatus::Available, now).await;
    add_courier(&mut tx, "+103", CourierStatus::Busy, now).await;

    add_delivery(&mut tx, "order-a1", a.id, now, deadline).await;
    add_delivery(&mut tx, "order-a2", a.id, now, deadline).await;
    add_delivery(&mut tx, "order-b1", b.id, now, deadline).await;
    add_delivery(&mut tx, "order-c1", c.id, now, deadline).await;

    // b and c both carry one delivery; the lower id wins.
    let picked = tx.find_available_courier().await.unwrap().unwrap();
    assert_eq!(picked.id, b.id);

    add_delivery(&mut tx, "order-b2", b.id, now, deadline).await;
    let picked = tx.find_available_courier().await.unwrap().unwrap();
    assert_eq!(picked.id, c.id);

    tx.rollback().await.unwrap();
    db.teardown().await;
}

#[tokio::test]
async fn concurrent_selection_skips_locked_courier() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let now = Utc::now();

    let mut setup = db.store.begin().await.unwrap();
    let first = add_courier(&mut setup, "+200", CourierStatus::Available, now).await;
    let second = add_courier(&mut setup, "+201", CourierStatus::Available, now).await;
    setup.commit().await.unwrap();

    let mut tx1 = db.store.begin().await.unwrap();
    let mut tx2 = db.store.begin().await.unwrap();

    let picked1 = tx1.find_available_courier().await.unwrap().unwrap();
    let picked2 = tx2.find_available_courier().await.unwrap().unwrap();
    assert_eq!(picked1.id, first.id);
    assert_eq!(picked2.id, second.id);

    let mut tx3 = db.store.begin().await.unwrap();
    assert!(tx3.find_available_courier().await.unwrap().is_none());

    tx3.rollback().await.unwrap();
    tx2.rollback().await.unwrap();
    tx1.rollback().await.unwrap();
    db.teardown().await;
}

#[tokio::test]
async fn sweep_only_considers_latest_delivery() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let now = Utc::now();
    let minutes = Duration::minutes;

    let mut tx = db.store.begin().await.unwrap();

    // Old delivery expired, latest still running.
    let running = add_courier(&mut tx, "+300", CourierStatus::Busy, now).await;
    add_delivery(&mut tx, "order-r1", running.id, now - minutes(30), now - minutes(25)).await;
    add_delivery(&mut tx, "order-r2", running.id, now - minutes(2), now + minutes(3)).await;

    // Older delivery still running, latest expired.
    let expired = add_courier(&mut tx, "+301", CourierStatus::Busy, now).await;
    add_delivery(&mut tx, "order-e1", expired.id, now - minutes(20), now + minutes(10)).await;
    add_delivery(&mut tx, "order-e2", expired.id, now - minutes(10), now - minutes(5)).await;

    let idle = add_courier(&mut tx, "+302", CourierStatus::Busy, now).await;

    let available = add_courier(&mut tx, "+303", CourierStatus::Available, now).await;
    add_delivery(&mut tx, "order-a1", available.id, now - minutes(10), now - minutes(5)).await;

    let freed = tx.free_couriers_with_interval(now).await.unwrap();
    assert_eq!(freed, 1);
    assert_eq!(status_of(&mut tx, running.id).await, CourierStatus::Busy);
    assert_eq!(status_of(&mut tx, expired.id).await, CourierStatus::Available);
    assert_eq!(status_of(&mut tx, idle.id).await, CourierStatus::Busy);
    assert_eq!(status_of(&mut tx, available.id).await, CourierStatus::Available);

    assert_eq!(tx.free_couriers_with_interval(now).await.unwrap(), 0);

    tx.rollback().await.unwrap();
    db.teardown().await;
}

#[tokio::test]
async fn unique_violations_become_conflicts() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let now = Utc::now();

    let mut setup = db.store.begin().await.unwrap();
    let courier = add_courier(&mut setup, "+400", CourierStatus::Available, now).await;
    add_delivery(&mut setup, "order-1", courier.id, now, now + Duration::minutes(5)).await;
    setup.commit().await.unwrap();

    // A failed statement aborts the transaction, so each case gets its own.
    let mut tx = db.store.begin().await.unwrap();
    let err = tx
        .create_delivery(NewDelivery {
            order_id: "order-1".to_string(),
            courier_id: courier.id,
            assigned_at: now,
            deadline: now + Duration::minutes(5),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    tx.rollback().await.unwrap();

    let mut tx = db.store.begin().await.unwrap();
    let err = tx
        .create_courier(
            NewCourier {
                name: "Duplicate".to_string(),
                phone: "+400".to_string(),
                transport_type: TransportType::Scooter,
            },
            now,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    tx.rollback().await.unwrap();

    db.teardown().await;
}

#[tokio::test]
async fn deleting_missing_delivery_is_not_found() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let now = Utc::now();

    let mut tx = db.store.begin().await.unwrap();
    let courier = add_courier(&mut tx, "+500", CourierStatus::Busy, now).await;
    add_delivery(&mut tx, "order-1", courier.id, now, now + Duration::minutes(5)).await;

    assert!(matches!(
        tx.delete_delivery("order-404").await,
        Err(StoreError::NotFound)
    ));

    tx.delete_delivery("order-1").await.unwrap();
    assert!(tx.couriers_delivery("order-1").await.unwrap().is_none());
    assert!(matches!(
        tx.delete_delivery("order-1").await,
        Err(StoreError::NotFound)
    ));

    tx.rollback().await.unwrap();
    db.teardown().await;
}

#[tokio::test]
async fn engines_commit_and_roll_back_against_postgres() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    let (state, _rx) = AppState::new(
        Arc::new(db.store.clone()),
        Arc::new(ManualClock::default()),
        8,
    );

    let courier = state
        .couriers
        .register(NewCourier {
            name: "Pat".to_string(),
            phone: "+600".to_string(),
            transport_type: TransportType::Scooter,
        })
        .await
        .unwrap();

    let assignment = state.assignments.assign("order-1").await.unwrap();
    assert_eq!(assignment.courier_id, courier.id);
    assert_eq!(
        state.couriers.get(courier.id).await.unwrap().status,
        CourierStatus::Busy
    );

    // Conflict after the courier was locked and selected: nothing sticks.
    let other = state
        .couriers
        .register(NewCourier {
            name: "Sam".to_string(),
            phone: "+601".to_string(),
            transport_type: TransportType::Car,
        })
        .await
        .unwrap();
    let err = state.assignments.assign("order-1").await.unwrap_err();
    assert!(matches!(err, AppError::OrderIdExists(_)));
    assert_eq!(
        state.couriers.get(other.id).await.unwrap().status,
        CourierStatus::Available
    );

    let release = state.releases.unassign("order-1").await.unwrap();
    assert_eq!(release.courier_id, courier.id);
    assert!(state.couriers.deliveries(courier.id).await.unwrap().is_empty());

    drop(state);
    db.teardown().await;
}

#[tokio::test]
async fn unknown_stored_transport_type_fails_assignment() {
    let Some(db) = TestDatabase::create().await else {
        return;
    };
    sqlx::query(
        "INSERT INTO couriers (name, phone, status, transport_type)
         VALUES ('Legacy', '+700', 'available', 'bicycle')",
    )
    .execute(db.store.pool())
    .await
    .unwrap();

    let (state, _rx) = AppState::new(
        Arc::new(db.store.clone()),
        Arc::new(ManualClock::default()),
        8,
    );
    let err = state.assignments.assign("order-1").await.unwrap_err();
    assert!(matches!(err, AppError::UnknownTransportType(raw) if raw == "bicycle"));

    let deliveries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delivery")
        .fetch_one(db.store.pool())
        .await
        .unwrap();
    assert_eq!(deliveries, 0);

    drop(state);
    db.teardown().await;
}
