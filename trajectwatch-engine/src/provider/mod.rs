//! Route provider boundary: given origin, destination and mode, return
//! duration and distance or fail.

mod distance_matrix;
mod routes;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use trajectwatch_core::{ConfigError, ProviderKind, WatchConfig};
use trajectwatch_protocol::{TravelMode, UNKNOWN_STATUS};

pub use distance_matrix::DistanceMatrixProvider;
pub use routes::RoutesProvider;

/// One routing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequest {
    pub origin: String,
    pub destination: String,
    pub mode: TravelMode,
}

/// A provider answer. Metrics are `None` when the provider had no usable value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteOutcome {
    pub duration_seconds: Option<u64>,
    pub distance_meters: Option<u64>,
    pub element_status: Option<String>,
    pub api_status: Option<String>,
}

impl RouteOutcome {
    /// Per-element status, else the overall status, else `UNKNOWN`.
    pub fn status(&self) -> String {
        [&self.element_status, &self.api_status]
            .into_iter()
            .flatten()
            .map(|status| status.trim())
            .find(|status| !status.is_empty())
            .unwrap_or(UNKNOWN_STATUS)
            .to_string()
    }
}

/// Failures raised while querying a routing API.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid provider url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected status code {status}")]
    UnexpectedStatus { status: reqwest::StatusCode },
    #[error("failed to decode provider response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait RouteProvider: Send + Sync + 'static {
    async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError>;
}

/// Builds the provider selected by the configuration.
pub fn build_provider(config: &WatchConfig) -> Result<Arc<dyn RouteProvider>, ConfigError> {
    let api_key = config.require_api_key()?.to_string();
    let provider: Arc<dyn RouteProvider> = match config.provider {
        ProviderKind::DistanceMatrix => {
            Arc::new(DistanceMatrixProvider::new(api_key).traffic_aware(config.traffic_aware))
        }
        ProviderKind::Routes => {
            Arc::new(RoutesProvider::new(api_key).traffic_aware(config.traffic_aware))
        }
    };
    Ok(provider)
}

/// Non-negative finite metric rounded to an integer.
pub(crate) fn metric(value: Option<f64>) -> Option<u64> {
    value
        .filter(|value| value.is_finite() && *value >= 0.0)
        .map(|value| value.round() as u64)
}
