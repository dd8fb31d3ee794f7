// ── Tracker domain types ──

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Identity reported by the tag itself; primary key of the tracker store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackerId(i32);

impl TrackerId {
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for TrackerId {
    fn from(raw: i32) -> Self {
        Self(raw)
    }
}

/// Species the tag is fitted to.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum AnimalType {
    #[default]
    Cow,
    Horse,
    Sheep,
    Goat,
    Pig,
}

/// Last known state of one tracking tag.
///
/// Mutated only by the upsert pipeline. `within_geofence` is computed by
/// an external collaborator and carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub id: TrackerId,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub animal_type: AnimalType,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub active: bool,
    pub within_geofence: bool,
}

impl TrackerRecord {
    /// Record created the first time a tag reports in.
    pub fn first_sighting(id: TrackerId, latitude: f64, longitude: f64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: format!("Device {id}"),
            description: "No description".into(),
            latitude,
            longitude,
            animal_type: AnimalType::default(),
            first_seen_at: now,
            last_seen_at: now,
            active: true,
            within_geofence: false,
        }
    }

    /// Apply a position fix. Identity, naming and geofence state are kept.
    pub fn apply_fix(&mut self, latitude: f64, longitude: f64, now: DateTime<Utc>) {
        self.latitude = latitude;
        self.longitude = longitude;
        self.last_seen_at = now;
        self.active = true;
    }
}
