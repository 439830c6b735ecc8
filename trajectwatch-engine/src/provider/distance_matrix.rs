use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{metric, ProviderError, RouteOutcome, RouteProvider, RouteRequest};

const DEFAULT_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/distancematrix/json";

/// Client for the legacy distance-matrix style API (one origin, one destination).
#[derive(Clone)]
pub struct DistanceMatrixProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    traffic_aware: bool,
}

impl DistanceMatrixProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            traffic_aware: true,
        }
    }

    /// Points the client at another endpoint, e.g. a local mock server.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Whether `duration_in_traffic` takes precedence over the static duration.
    pub fn traffic_aware(mut self, enabled: bool) -> Self {
        self.traffic_aware = enabled;
        self
    }

    fn request_url(&self, request: &RouteRequest) -> Result<Url, ProviderError> {
        let mut url = Url::parse(&self.endpoint).map_err(|err| ProviderError::InvalidUrl {
            url: self.endpoint.clone(),
            source: err,
        })?;
        url.query_pairs_mut()
            .append_pair("origins", &request.origin)
            .append_pair("destinations", &request.destination)
            .append_pair("departure_time", "now")
            .append_pair("mode", request.mode.as_str())
            .append_pair("key", &self.api_key);
        Ok(url)
    }
}

#[async_trait]
impl RouteProvider for DistanceMatrixProvider {
    async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError> {
        let url = self.request_url(request)?;

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| ProviderError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: response.status(),
            });
        }

        let payload: MatrixResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        Ok(payload.into_outcome(self.traffic_aware))
    }
}

#[derive(Debug, Default, Deserialize)]
struct MatrixResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    rows: Vec<MatrixRow>,
}

#[derive(Debug, Default, Deserialize)]
struct MatrixRow {
    #[serde(default)]
    elements: Vec<MatrixElement>,
}

#[derive(Debug, Default, Deserialize)]
struct MatrixElement {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    distance: Option<ValueField>,
    #[serde(default)]
    duration: Option<ValueField>,
    #[serde(default)]
    duration_in_traffic: Option<ValueField>,
}

#[derive(Debug, Default, Deserialize)]
struct ValueField {
    #[serde(default)]
    value: Option<f64>,
}

impl MatrixResponse {
    fn into_outcome(self, traffic_aware: bool) -> RouteOutcome {
        let element = self
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.elements.into_iter().next());

        let Some(element) = element else {
            return RouteOutcome {
                api_status: self.status,
                ..RouteOutcome::default()
            };
        };

        let value = |field: Option<ValueField>| field.and_then(|field| field.value);
        let static_duration = value(element.duration);
        let traffic_duration = value(element.duration_in_traffic);
        let duration = if traffic_aware {
            metric(traffic_duration).or(metric(static_duration))
        } else {
            metric(static_duration)
        };

        RouteOutcome {
            duration_seconds: duration,
            distance_meters: metric(value(element.distance)),
            element_status: element.status,
            api_status: self.status,
        }
    }
}
