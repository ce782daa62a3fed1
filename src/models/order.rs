use serde::{Deserialize, Serialize};

/// Order status as published by the upstream order service. Only the
/// transitions that affect couriers are named; the rest pass through as
/// `Other` and are ignored by the consumer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    Cancelled,
    Completed,
    #[serde(untagged)]
    Other(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: String,
    pub status: OrderStatus,
}

#[cfg(test)]
mod tests {
    use super::{OrderStatus, OrderStatusChanged};

    #[test]
    fn unknown_statuses_deserialize_as_other() {
        let event: OrderStatusChanged =
            serde_json::from_str(r#"{"order_id":"o-1","status":"in_delivery"}"#).unwrap();
        assert_eq!(event.status, OrderStatus::Other("in_delivery".to_string()));

        let event: OrderStatusChanged =
            serde_json::from_str(r#"{"order_id":"o-1","status":"cancelled"}"#).unwrap();
        assert_eq!(event.status, OrderStatus::Cancelled);
    }
}
