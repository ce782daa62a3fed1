use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::courier::TransportType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub courier_id: i64,
    pub order_id: String,
    pub transport_type: TransportType,
    pub delivery_deadline: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    Unassigned,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Release {
    pub courier_id: i64,
    pub order_id: String,
    pub status: ReleaseStatus,
}
