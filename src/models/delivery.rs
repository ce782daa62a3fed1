use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live binding between an order and the courier responsible for it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Delivery {
    pub id: i64,
    pub order_id: String,
    pub courier_id: i64,
    pub assigned_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub order_id: String,
    pub courier_id: i64,
    pub assigned_at: DateTime<Utc>,
    pub deadline: DateTime<Utc>,
}
