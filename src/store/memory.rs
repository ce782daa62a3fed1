//! In-process store with serializable transactions.
//!
//! A transaction takes the table lock for its whole lifetime and works on a
//! private copy of the tables. Commit swaps the copy in; rollback and drop
//! discard it.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::courier::{Courier, CourierStatus, NewCourier};
use crate::models::delivery::{Delivery, NewDelivery};
use crate::store::{CourierStore, DeliveryStore, Store, StoreError, StoreResult, Transaction};

#[derive(Debug, Clone, Default)]
struct Tables {
    couriers: BTreeMap<i64, Courier>,
    deliveries: BTreeMap<i64, Delivery>,
    last_courier_id: i64,
    last_delivery_id: i64,
}

impl Tables {
    fn load_of(&self, courier_id: i64) -> usize {
        self.deliveries
            .values()
            .filter(|delivery| delivery.courier_id == courier_id)
            .count()
    }

    fn latest_delivery_of(&self, courier_id: i64) -> Option<&Delivery> {
        self.deliveries
            .values()
            .filter(|delivery| delivery.courier_id == courier_id)
            .max_by_key(|delivery| (delivery.assigned_at, delivery.id))
    }

    fn phone_taken(&self, phone: &str, except: Option<i64>) -> bool {
        self.couriers
            .values()
            .any(|courier| courier.phone == phone && Some(courier.id) != except)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn Transaction>> {
        let guard = self.tables.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryTransaction { guard, working }))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

pub struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTransaction { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl CourierStore for MemoryTransaction {
    async fn create_courier(
        &mut self,
        courier: NewCourier,
        now: DateTime<Utc>,
    ) -> StoreResult<Courier> {
        if self.working.phone_taken(&courier.phone, None) {
            return Err(StoreError::Conflict(format!(
                "phone {} already registered",
                courier.phone
            )));
        }

        self.working.last_courier_id += 1;
        let created = Courier {
            id: self.working.last_courier_id,
            name: courier.name,
            phone: courier.phone,
            status: CourierStatus::Available,
            transport_type: courier.transport_type,
            created_at: now,
            updated_at: now,
        };
        self.working.couriers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_courier_by_id(&mut self, id: i64) -> StoreResult<Option<Courier>> {
        Ok(self.working.couriers.get(&id).cloned())
    }

    async fn list_couriers(&mut self, limit: i64, offset: i64) -> StoreResult<Vec<Courier>> {
        let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let take = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .working
            .couriers
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn courier_exists(&mut self, id: i64) -> StoreResult<bool> {
        Ok(self.working.couriers.contains_key(&id))
    }

    async fn update_courier(&mut self, courier: &Courier) -> StoreResult<()> {
        if !self.working.couriers.contains_key(&courier.id) {
            return Err(StoreError::NotFound);
        }
        if self.working.phone_taken(&courier.phone, Some(courier.id)) {
            return Err(StoreError::Conflict(format!(
                "phone {} already registered",
                courier.phone
            )));
        }
        self.working.couriers.insert(courier.id, courier.clone());
        Ok(())
    }

    async fn find_available_courier(&mut self) -> StoreResult<Option<Courier>> {
        // BTreeMap iterates by id, so min_by_key keeps the lowest id on ties.
        let courier = self
            .working
            .couriers
            .values()
            .filter(|courier| courier.status == CourierStatus::Available)
            .min_by_key(|courier| self.working.load_of(courier.id))
            .cloned();
        Ok(courier)
    }

    async fn get_courier_id_by_order_id(&mut self, order_id: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .working
            .deliveries
            .values()
            .find(|delivery| delivery.order_id == order_id)
            .map(|delivery| delivery.courier_id))
    }

    async fn free_couriers_with_interval(&mut self, now: DateTime<Utc>) -> StoreResult<u64> {
        let expired: Vec<i64> = self
            .working
            .couriers
            .values()
            .filter(|courier| courier.status == CourierStatus::Busy)
            .filter(|courier| {
                self.working
                    .latest_delivery_of(courier.id)
                    .is_some_and(|delivery| delivery.deadline < now)
            })
            .map(|courier| courier.id)
            .collect();

        for id in &expired {
            if let Some(courier) = self.working.couriers.get_mut(id) {
                courier.status = CourierStatus::Available;
                courier.updated_at = now;
            }
        }

        Ok(expired.len() as u64)
    }
}

#[async_trait]
impl DeliveryStore for MemoryTransaction {
    async fn create_delivery(&mut self, delivery: NewDelivery) -> StoreResult<Delivery> {
        if !self.working.couriers.contains_key(&delivery.courier_id) {
            return Err(StoreError::Corrupt(format!(
                "delivery references missing courier {}",
                delivery.courier_id
            )));
        }
        if self
            .working
            .deliveries
            .values()
            .any(|existing| existing.order_id == delivery.order_id)
        {
            return Err(StoreError::Conflict(format!(
                "order {} already has a delivery",
                delivery.order_id
            )));
        }

        self.working.last_delivery_id += 1;
        let created = Delivery {
            id: self.working.last_delivery_id,
            order_id: delivery.order_id,
            courier_id: delivery.courier_id,
            assigned_at: delivery.assigned_at,
            deadline: delivery.deadline,
        };
        self.working.deliveries.insert(created.id, created.clone());
        Ok(created)
    }

    async fn couriers_delivery(&mut self, order_id: &str) -> StoreResult<Option<Delivery>> {
        Ok(self
            .working
            .deliveries
            .values()
            .find(|delivery| delivery.order_id == order_id)
            .cloned())
    }

    async fn delete_delivery(&mut self, order_id: &str) -> StoreResult<()> {
        let id = self
            .working
            .deliveries
            .values()
            .find(|delivery| delivery.order_id == order_id)
            .map(|delivery| delivery.id)
            .ok_or(StoreError::NotFound)?;
        self.working.deliveries.remove(&id);
        Ok(())
    }

    async fn deliveries_for_courier(&mut self, courier_id: i64) -> StoreResult<Vec<Delivery>> {
        Ok(self
            .working
            .deliveries
            .values()
            .filter(|delivery| delivery.courier_id == courier_id)
            .cloned()
            .collect())
    }
}
