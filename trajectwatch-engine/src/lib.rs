//! TrajectWatch engine: traject polling, the per-traject measurement log and
//! the read-only query surface consumed by the dashboard.

pub mod api;
pub mod csv;
pub mod error;
pub mod history;
pub mod log;
pub mod provider;
pub mod scheduler;
pub mod service;
pub mod store;

pub use api::{ConfigSummary, TrajectApiBuilder};
pub use error::EngineError;
pub use history::{HistoryQuery, HistoryReader, HistoryView};
pub use log::MeasurementLog;
pub use provider::{
    build_provider, DistanceMatrixProvider, ProviderError, RouteOutcome, RouteProvider,
    RouteRequest, RoutesProvider,
};
pub use scheduler::{PollerHandle, TrajectScheduler};
pub use service::TrajectService;
pub use store::{TrajectDefaults, TrajectStore};
