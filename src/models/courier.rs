use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    Car,
    Scooter,
    OnFoot,
}

impl TransportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportType::Car => "car",
            TransportType::Scooter => "scooter",
            TransportType::OnFoot => "on_foot",
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportType {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "car" => Ok(TransportType::Car),
            "scooter" => Ok(TransportType::Scooter),
            "on_foot" => Ok(TransportType::OnFoot),
            other => Err(AppError::UnknownTransportType(other.to_string())),
        }
    }
}

/// Availability of a courier.
///
/// Transitions are only driven by the engines: assignment occupies an
/// available courier, while unassign, complete and the expiry sweep release a
/// busy one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourierStatus {
    Available,
    Busy,
}

impl CourierStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CourierStatus::Available => "available",
            CourierStatus::Busy => "busy",
        }
    }

    pub fn occupy(self) -> Result<CourierStatus, AppError> {
        match self {
            CourierStatus::Available => Ok(CourierStatus::Busy),
            CourierStatus::Busy => Err(AppError::InvalidTransition {
                from: self,
                to: CourierStatus::Busy,
            }),
        }
    }

    /// Every status can be released. Releasing an available courier is a
    /// no-op: the sweeper may already have freed it before the explicit
    /// release arrives.
    pub fn release(self) -> CourierStatus {
        CourierStatus::Available
    }
}

impl fmt::Display for CourierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourierStatus {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "available" => Ok(CourierStatus::Available),
            "busy" => Ok(CourierStatus::Busy),
            other => Err(AppError::Internal(format!("unknown courier status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Courier {
    pub id: i64,
    pub name: String,
    pub phone: String,
    pub status: CourierStatus,
    pub transport_type: TransportType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Courier {
    pub fn occupy(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        self.status = self.status.occupy()?;
        self.updated_at = now;
        Ok(())
    }

    pub fn release(&mut self, now: DateTime<Utc>) {
        self.status = self.status.release();
        self.updated_at = now;
    }
}

/// Fields accepted when registering a courier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourier {
    pub name: String,
    pub phone: String,
    pub transport_type: TransportType,
}

/// Partial profile update. Status is deliberately absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourierProfile {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub transport_type: Option<TransportType>,
}

#[cfg(test)]
mod tests {
    use super::{CourierStatus, TransportType};
    use crate::error::AppError;

    #[test]
    fn available_courier_can_be_occupied() {
        assert_eq!(
            CourierStatus::Available.occupy().unwrap(),
            CourierStatus::Busy
        );
    }

    #[test]
    fn busy_courier_cannot_be_occupied_twice() {
        let err = CourierStatus::Busy.occupy().unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition {
                from: CourierStatus::Busy,
                to: CourierStatus::Busy
            }
        ));
    }

    #[test]
    fn release_is_idempotent() {
        assert_eq!(CourierStatus::Busy.release(), CourierStatus::Available);
        assert_eq!(CourierStatus::Available.release(), CourierStatus::Available);
    }

    #[test]
    fn transport_type_parses_wire_names() {
        assert_eq!("car".parse::<TransportType>().unwrap(), TransportType::Car);
        assert_eq!(
            "on_foot".parse::<TransportType>().unwrap(),
            TransportType::OnFoot
        );
        assert!(matches!(
            "bicycle".parse::<TransportType>(),
            Err(AppError::UnknownTransportType(raw)) if raw == "bicycle"
        ));
    }
}
