use thiserror::Error;
use trajectwatch_core::WatchError;
use trajectwatch_protocol::ValidationError;

/// Errors surfaced by the traject store and the query facade.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("traject not found: {0}")]
    TrajectNotFound(String),
    #[error("no trajects registered")]
    NoTrajects,
    #[error("storage failure: {0}")]
    Storage(#[from] WatchError),
}
