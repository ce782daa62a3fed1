use chrono::{DateTime, Duration, Utc};

use crate::models::courier::TransportType;

/// Fixed delivery window for a transport type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryCalculator {
    transport_type: TransportType,
}

impl DeliveryCalculator {
    pub fn new(transport_type: TransportType) -> Self {
        Self { transport_type }
    }

    pub fn transport_type(&self) -> TransportType {
        self.transport_type
    }

    pub fn duration(&self) -> Duration {
        match self.transport_type {
            TransportType::Car => Duration::minutes(5),
            TransportType::Scooter => Duration::minutes(10),
            TransportType::OnFoot => Duration::minutes(15),
        }
    }

    pub fn deadline_from(&self, assigned_at: DateTime<Utc>) -> DateTime<Utc> {
        assigned_at + self.duration()
    }
}

impl From<TransportType> for DeliveryCalculator {
    fn from(transport_type: TransportType) -> Self {
        Self::new(transport_type)
    }
}
