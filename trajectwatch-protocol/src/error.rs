use thiserror::Error;

/// Reasons a traject registration is rejected before anything is persisted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingLocation { field: &'static str },
    #[error("{field} contains a non-finite coordinate")]
    InvalidCoordinate { field: &'static str },
    #[error("origin and destination are the same location {0:?}")]
    SameEndpoints(String),
    #[error("a traject with id {0:?} already exists")]
    DuplicateId(String),
    #[error("unsupported travel mode {0:?} (expected driving, walking, bicycling or transit)")]
    UnsupportedMode(String),
    #[error("log file {0:?} must be a plain `.csv` file name")]
    InvalidLogFile(String),
    #[error("log file {0:?} already belongs to another traject")]
    DuplicateLogFile(String),
}
