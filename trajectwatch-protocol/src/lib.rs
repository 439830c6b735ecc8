pub mod error;
pub mod measurement;
pub mod traject;

pub use error::ValidationError;
pub use measurement::{
    floor_to_minute, format_timestamp, timestamp_now, AlignedRow, Direction, Measurement, Snapshot,
    ERROR_STATUS, UNKNOWN_STATUS,
};
pub use traject::{
    parse_coordinates, IntervalInput, LocationInput, Traject, TrajectSpec, TravelMode,
    MAX_INTERVAL_MINUTES,
};
