use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::measurement::Direction;

const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Longest accepted polling interval: one leap year.
pub const MAX_INTERVAL_MINUTES: f64 = 527_040.0;

/// Travel modes understood by the routing providers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Driving,
    Walking,
    Bicycling,
    Transit,
}

impl TravelMode {
    pub const ALL: [TravelMode; 4] = [
        TravelMode::Driving,
        TravelMode::Walking,
        TravelMode::Bicycling,
        TravelMode::Transit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
            TravelMode::Transit => "transit",
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TravelMode {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        TravelMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnsupportedMode(value.to_string()))
    }
}

/// A monitored route. Never mutated once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Traject {
    pub id: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub mode: TravelMode,
    pub interval_minutes: f64,
    pub log_file: String,
}

impl Traject {
    /// Returns `(origin, destination)` as queried for the given direction.
    pub fn endpoints(&self, direction: Direction) -> (&str, &str) {
        match direction {
            Direction::Forward => (&self.origin, &self.destination),
            Direction::Reverse => (&self.destination, &self.origin),
        }
    }

    /// Classifies a recorded `(origin, destination)` pair against this traject.
    ///
    /// Pairs matching neither orientation (for example rows written before the
    /// endpoints were changed) yield `None`. A traject whose endpoints are equal
    /// classifies every matching pair as forward.
    pub fn direction_of(&self, origin: &str, destination: &str) -> Option<Direction> {
        if origin == self.origin && destination == self.destination {
            Some(Direction::Forward)
        } else if origin == self.destination && destination == self.origin {
            Some(Direction::Reverse)
        } else {
            None
        }
    }

    /// Polling period derived from `interval_minutes`, clamped to
    /// `[1s, MAX_INTERVAL_MINUTES]`.
    pub fn interval(&self) -> Duration {
        let minutes = if self.interval_minutes.is_nan() {
            0.0
        } else {
            self.interval_minutes.min(MAX_INTERVAL_MINUTES)
        };
        Duration::try_from_secs_f64(minutes * 60.0)
            .unwrap_or(Duration::ZERO)
            .max(MIN_INTERVAL)
    }
}

/// A location as accepted on registration: free text, `[lat, lng]` or `{lat, lng}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LocationInput {
    Text(String),
    Pair([f64; 2]),
    Point {
        lat: f64,
        #[serde(alias = "lon")]
        lng: f64,
    },
}

impl LocationInput {
    /// Normalizes the location into the stored string form.
    ///
    /// Coordinates (including `"lat, lng"` text) become `"<lat>,<lng>"`; free
    /// text is trimmed. Empty input is rejected for `field`.
    pub fn normalize(&self, field: &'static str) -> Result<String, ValidationError> {
        match self {
            LocationInput::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::MissingLocation { field });
                }
                match parse_coordinates(trimmed) {
                    Some((lat, lng)) => format_coordinates(lat, lng, field),
                    None => Ok(trimmed.to_string()),
                }
            }
            LocationInput::Pair([lat, lng]) => format_coordinates(*lat, *lng, field),
            LocationInput::Point { lat, lng } => format_coordinates(*lat, *lng, field),
        }
    }
}

impl From<&str> for LocationInput {
    fn from(value: &str) -> Self {
        LocationInput::Text(value.to_string())
    }
}

/// Parses `"lat,lng"` text into finite coordinates.
pub fn parse_coordinates(text: &str) -> Option<(f64, f64)> {
    let (lat, lng) = text.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lng: f64 = lng.trim().parse().ok()?;
    (lat.is_finite() && lng.is_finite()).then_some((lat, lng))
}

fn format_coordinates(lat: f64, lng: f64, field: &'static str) -> Result<String, ValidationError> {
    if !lat.is_finite() || !lng.is_finite() {
        return Err(ValidationError::InvalidCoordinate { field });
    }
    Ok(format!("{lat},{lng}"))
}

/// Polling interval as supplied by a client; numbers and numeric strings are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum IntervalInput {
    Number(f64),
    Text(String),
}

impl IntervalInput {
    /// Returns the interval when it is positive and at most `MAX_INTERVAL_MINUTES`.
    pub fn coerce(&self) -> Option<f64> {
        let value = match self {
            IntervalInput::Number(value) => *value,
            IntervalInput::Text(text) => text.trim().parse().ok()?,
        };
        (value > 0.0 && value <= MAX_INTERVAL_MINUTES).then_some(value)
    }
}

/// Partial traject definition submitted for registration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrajectSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub origin: Option<LocationInput>,
    #[serde(default)]
    pub destination: Option<LocationInput>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub interval_minutes: Option<IntervalInput>,
    #[serde(default)]
    pub log_file: Option<String>,
}

impl TrajectSpec {
    pub fn new(origin: impl Into<LocationInput>, destination: impl Into<LocationInput>) -> Self {
        Self {
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn mode(mut self, mode: TravelMode) -> Self {
        self.mode = Some(mode.as_str().to_string());
        self
    }

    pub fn interval_minutes(mut self, minutes: f64) -> Self {
        self.interval_minutes = Some(IntervalInput::Number(minutes));
        self
    }
}
