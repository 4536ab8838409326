//! crates/vaccimap_core/src/domain.rs
//!
//! Defines the pure, core data structures for the client.
//! These types are independent of any identity vendor, document store or device API.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::FieldError;

//=========================================================================================
// Identity
//=========================================================================================

/// The stable identifier the identity provider assigns to an authenticated subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(pub Uuid);

impl SubjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A phone number in E.164 form, e.g. `+15551234567`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// E.164 caps the number at 15 digits after the `+`.
    pub const MAX_DIGITS: usize = 15;

    /// Parses user input into an E.164 number.
    ///
    /// Whitespace is ignored so that `+91 9876543210` is accepted as typed.
    /// Anything else must be a leading `+` followed by digits only.
    pub fn parse(raw: &str) -> Result<Self, FieldError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        let digits = compact
            .strip_prefix('+')
            .ok_or(FieldError::PhoneNotE164)?;

        let well_formed = !digits.is_empty()
            && digits.len() <= Self::MAX_DIGITS
            && digits.chars().all(|c| c.is_ascii_digit())
            && !digits.starts_with('0');
        if !well_formed {
            return Err(FieldError::PhoneNotE164);
        }
        Ok(Self(compact))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(value: PhoneNumber) -> Self {
        value.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An authenticated identity handle. The application only ever holds a copy;
/// the identity provider owns the real thing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub subject_id: SubjectId,
    pub phone_number: PhoneNumber,
}

/// Opaque identifier of an in-progress OTP verification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChallengeId(pub String);

impl fmt::Display for ChallengeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that the anti-automation step completed before a challenge is requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierToken(pub String);

//=========================================================================================
// Location
//=========================================================================================

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A latitude/longitude pair in floating point degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
    }
}

/// A single device coordinate reading. Fixes are never cached or shared
/// between screens; each screen asks for its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub coordinates: Coordinates,
    pub captured_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    Balanced,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
}

//=========================================================================================
// Profile
//=========================================================================================

/// The persisted per-subject record. At most one exists per subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub subject_id: SubjectId,
    pub phone_number: PhoneNumber,
    pub parent_name: String,
    pub child_name: String,
    pub child_dob: NaiveDate,
    pub home_location: Coordinates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The full payload written when a profile is first created.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub phone_number: PhoneNumber,
    pub parent_name: String,
    pub child_name: String,
    pub child_dob: NaiveDate,
    pub home_location: Coordinates,
    pub created_at: DateTime<Utc>,
}

impl NewProfile {
    pub fn into_profile(self, subject_id: SubjectId) -> Profile {
        Profile {
            subject_id,
            phone_number: self.phone_number,
            parent_name: self.parent_name,
            child_name: self.child_name,
            child_dob: self.child_dob,
            home_location: self.home_location,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

/// A partial update of a profile's home location.
///
/// Carries the location and the timestamp and nothing else, so the identity
/// fields of a profile can never be overwritten through it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HomeLocationPatch {
    pub home_location: Coordinates,
    pub updated_at: DateTime<Utc>,
}

impl HomeLocationPatch {
    pub fn field_names() -> &'static [&'static str] {
        &["home_location", "updated_at"]
    }

    pub fn apply_to(&self, profile: &mut Profile) {
        profile.home_location = self.home_location;
        profile.updated_at = self.updated_at;
    }
}

//=========================================================================================
// Vaccination schedule (static, bundled)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingDose {
    pub vaccine: String,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationCenter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub coordinates: Coordinates,
}

/// Read-only record of which vaccines are done, which doses are next, and where
/// they can be given.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VaccinationSchedule {
    /// Vaccine name and whether it is done, in the order the source lists them.
    #[serde(with = "ordered_status")]
    pub status: Vec<(String, bool)>,
    pub upcoming: Vec<UpcomingDose>,
    #[serde(default)]
    pub centers: Vec<VaccinationCenter>,
}

impl VaccinationSchedule {
    pub fn is_done(&self, vaccine: &str) -> Option<bool> {
        self.status
            .iter()
            .find(|(name, _)| name == vaccine)
            .map(|(_, done)| *done)
    }

    pub fn nearest_center(&self, from: &Coordinates) -> Option<(&VaccinationCenter, f64)> {
        self.centers
            .iter()
            .map(|center| (center, from.distance_km(&center.coordinates)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

/// The status is a JSON object; this keeps its entries in document order.
mod ordered_status {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(status: &[(String, bool)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(status.len()))?;
        for (vaccine, done) in status {
            map.serialize_entry(vaccine, done)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, bool)>, D::Error> {
        struct InOrder;

        impl<'de> Visitor<'de> for InOrder {
            type Value = Vec<(String, bool)>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of vaccine name to completion flag")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut status = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(entry) = access.next_entry::<String, bool>()? {
                    status.push(entry);
                }
                Ok(status)
            }
        }

        deserializer.deserialize_map(InOrder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_number_accepts_e164_and_spaced_input() {
        assert_eq!(PhoneNumber::parse("+15551234567").unwrap().as_str(), "+15551234567");
        assert_eq!(PhoneNumber::parse("+91 9876543210").unwrap().as_str(), "+919876543210");
    }

    #[test]
    fn phone_number_rejects_malformed_input() {
        for raw in ["15551234567", "", "+", "+0123", "+1555-123", "+1234567890123456", "+1a"] {
            assert_eq!(PhoneNumber::parse(raw), Err(FieldError::PhoneNotE164), "{raw}");
        }
    }

    #[test]
    fn distance_between_chennai_and_bangalore_is_plausible() {
        let chennai = Coordinates::new(13.0827, 80.2707);
        let bangalore = Coordinates::new(12.9716, 77.5946);
        let km = chennai.distance_km(&bangalore);
        assert!((280.0..300.0).contains(&km), "got {km}");
        assert_eq!(chennai.distance_km(&chennai), 0.0);
    }

    #[test]
    fn antipodal_distance_is_half_the_circumference() {
        let here = Coordinates::new(12.9716, 77.5946);
        let opposite = Coordinates::new(-12.9716, 77.5946 - 180.0);
        let km = here.distance_km(&opposite);
        assert!(km.is_finite());
        assert!((km - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1.0, "got {km}");
    }

    #[test]
    fn status_keeps_the_listed_order() {
        let raw = r#"{"status": {"opv": true, "bcg": true, "measles": false}, "upcoming": []}"#;
        let schedule: VaccinationSchedule = serde_json::from_str(raw).unwrap();
        let names: Vec<&str> = schedule.status.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["opv", "bcg", "measles"]);
        assert_eq!(schedule.is_done("measles"), Some(false));
        assert_eq!(schedule.is_done("rota"), None);

        let written = serde_json::to_string(&schedule).unwrap();
        assert!(written.starts_with(r#"{"status":{"opv":true,"bcg":true,"measles":false}"#));
    }

    #[test]
    fn nearest_center_picks_the_closest() {
        let schedule = VaccinationSchedule {
            centers: vec![
                VaccinationCenter {
                    name: "Far".into(),
                    description: String::new(),
                    coordinates: Coordinates::new(28.61, 77.20),
                },
                VaccinationCenter {
                    name: "Near".into(),
                    description: String::new(),
                    coordinates: Coordinates::new(12.8245, 80.0450),
                },
            ],
            ..Default::default()
        };
        let (center, _) = schedule.nearest_center(&Coordinates::new(12.9, 80.1)).unwrap();
        assert_eq!(center.name, "Near");
        assert!(VaccinationSchedule::default().nearest_center(&Coordinates::new(0.0, 0.0)).is_none());
    }
}
