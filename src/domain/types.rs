//! Shared types for the field punch pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Mean Earth radius used for displacement checks (meters)
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// A single location fix. Immutable once captured.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance in meters (haversine)
    pub fn distance_m(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlng = (other.lng - self.lng).to_radians();

        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }

    /// `"{lat}, {lng}"` with five decimals each
    pub fn to_fixed5(&self) -> String {
        format!("{:.5}, {:.5}", self.lat, self.lng)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5},{:.5}", self.lat, self.lng)
    }
}

/// Externally observed place name. Never absent: either a resolved
/// name or one of the sentinels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceName {
    Named(String),
    Resolving,
    Unavailable,
    PermissionDenied,
    ServicesDisabled,
}

impl PlaceName {
    pub fn is_named(&self) -> bool {
        matches!(self, PlaceName::Named(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlaceName::Named(text) => text,
            PlaceName::Resolving => "Fetching address...",
            PlaceName::Unavailable => "Address Unavailable",
            PlaceName::PermissionDenied => "Location permission denied",
            PlaceName::ServicesDisabled => "Location services disabled",
        }
    }
}

impl fmt::Display for PlaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Foreground location permission state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    #[default]
    Undetermined,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        *self == Permission::Granted
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Granted => "granted",
            Permission::Denied => "denied",
            Permission::Undetermined => "undetermined",
        }
    }
}

/// Punch direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "punch_in")]
    In,
    #[serde(rename = "punch_out")]
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "punch_in",
            Direction::Out => "punch_out",
        }
    }
}

/// Signed-in employee, persisted by the identity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionIdentity {
    pub employee_name: String,
    pub employee_phone: String,
    pub token: String,
}

/// Attendance event handed to the submission backend.
///
/// Built only by `PunchSession`; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    pub employee_name: String,
    pub company_name: String,
    pub shop_name: String,
    pub amount: f64,
    #[serde(rename = "location", skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(rename = "place")]
    pub place_name: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fixed5() {
        let c = Coordinates::new(10.9, 75.92345678);
        assert_eq!(c.to_fixed5(), "10.90000, 75.92346");

        let neg = Coordinates::new(-33.8688197, 151.2092955);
        assert_eq!(neg.to_fixed5(), "-33.86882, 151.20930");
    }

    #[test]
    fn test_distance_m() {
        let a = Coordinates::new(10.9000, 75.9200);
        assert!(a.distance_m(&a) < 1e-6);

        // ~0.0001 deg latitude is ~11.1 m
        let b = Coordinates::new(10.9001, 75.9200);
        let d = a.distance_m(&b);
        assert!(d > 10.5 && d < 11.7, "distance was {d}");
    }

    #[test]
    fn test_place_name_sentinels_never_empty() {
        for name in [
            PlaceName::Resolving,
            PlaceName::Unavailable,
            PlaceName::PermissionDenied,
            PlaceName::ServicesDisabled,
        ] {
            assert!(!name.as_str().is_empty());
            assert!(!name.is_named());
        }
        assert_eq!(PlaceName::Named("Tirur".into()).to_string(), "Tirur");
    }

    #[test]
    fn test_punch_event_serialization() {
        let event = PunchEvent {
            id: new_uuid_v7(),
            direction: Direction::In,
            employee_id: Some("9876543210".into()),
            employee_name: "Asha".into(),
            company_name: "Cochin Traders".into(),
            shop_name: "Acme".into(),
            amount: 100.0,
            coordinates: Some(Coordinates::new(10.9, 75.9)),
            place_name: "Tirur, Malappuram".into(),
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "punch_in");
        assert_eq!(json["shopName"], "Acme");
        assert_eq!(json["place"], "Tirur, Malappuram");
        assert_eq!(json["location"]["lat"], 10.9);
        assert_eq!(json["employeeId"], "9876543210");
    }
}
