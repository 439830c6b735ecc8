use chrono::{DateTime, Duration, DurationRound, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Status recorded when a routing query failed for any reason.
pub const ERROR_STATUS: &str = "ERROR";

/// Status recorded when the provider answered without any status token.
pub const UNKNOWN_STATUS: &str = "UNKNOWN";

/// Which way a traject was queried.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Reverse,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::Forward, Direction::Reverse];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }
}

/// Outcome of a single routing query, as appended to a traject's log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Measurement {
    #[serde(rename = "timestamp_iso", with = "iso_millis")]
    pub timestamp: DateTime<Utc>,
    pub duration_seconds: Option<u64>,
    pub distance_meters: Option<u64>,
    pub status: String,
    pub origin: String,
    pub destination: String,
    pub mode: String,
}

impl Measurement {
    /// Builds the record written for a failed query.
    pub fn failed(
        timestamp: DateTime<Utc>,
        origin: impl Into<String>,
        destination: impl Into<String>,
        mode: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            duration_seconds: None,
            distance_meters: None,
            status: ERROR_STATUS.to_string(),
            origin: origin.into(),
            destination: destination.into(),
            mode: mode.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ERROR_STATUS
    }

    /// Timestamp in the log's textual form, e.g. `2024-05-01T12:03:10.123Z`.
    pub fn timestamp_iso(&self) -> String {
        format_timestamp(&self.timestamp)
    }

    /// The whole minute this measurement falls in.
    pub fn minute(&self) -> DateTime<Utc> {
        floor_to_minute(self.timestamp)
    }
}

/// Current time truncated to the millisecond precision the log stores.
pub fn timestamp_now() -> DateTime<Utc> {
    let now = Utc::now();
    now.duration_trunc(Duration::milliseconds(1)).unwrap_or(now)
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn floor_to_minute(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .duration_trunc(Duration::minutes(1))
        .unwrap_or(timestamp)
}

/// Most recent measurement per direction for one traject. Not durable.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    pub forward: Option<Measurement>,
    pub reverse: Option<Measurement>,
}

impl Snapshot {
    pub fn get(&self, direction: Direction) -> Option<&Measurement> {
        match direction {
            Direction::Forward => self.forward.as_ref(),
            Direction::Reverse => self.reverse.as_ref(),
        }
    }

    pub fn set(&mut self, direction: Direction, measurement: Measurement) {
        match direction {
            Direction::Forward => self.forward = Some(measurement),
            Direction::Reverse => self.reverse = Some(measurement),
        }
    }
}

/// One row of the side-by-side table: both directions observed within the same minute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedRow {
    #[serde(with = "iso_millis")]
    pub minute: DateTime<Utc>,
    pub forward: Option<Measurement>,
    pub reverse: Option<Measurement>,
}

mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|parsed| parsed.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
