use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use trajectwatch_protocol::{parse_coordinates, TravelMode};
use url::Url;

use super::{metric, ProviderError, RouteOutcome, RouteProvider, RouteRequest};

const DEFAULT_ENDPOINT: &str = "https://routes.googleapis.com/directions/v2:computeRoutes";
const FIELD_MASK: &str = "routes.duration,routes.staticDuration,routes.distanceMeters";

/// Client for the `computeRoutes` API.
#[derive(Clone)]
pub struct RoutesProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    traffic_aware: bool,
}

impl RoutesProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            traffic_aware: true,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn traffic_aware(mut self, enabled: bool) -> Self {
        self.traffic_aware = enabled;
        self
    }

    fn body(&self, request: &RouteRequest) -> ComputeRoutesRequest {
        let routing_preference = (self.traffic_aware && request.mode == TravelMode::Driving)
            .then_some("TRAFFIC_AWARE");
        ComputeRoutesRequest {
            origin: Waypoint::from_location(&request.origin),
            destination: Waypoint::from_location(&request.destination),
            travel_mode: travel_mode(request.mode),
            routing_preference,
        }
    }
}

fn travel_mode(mode: TravelMode) -> &'static str {
    match mode {
        TravelMode::Driving => "DRIVE",
        TravelMode::Walking => "WALK",
        TravelMode::Bicycling => "BICYCLE",
        TravelMode::Transit => "TRANSIT",
    }
}

#[async_trait]
impl RouteProvider for RoutesProvider {
    async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError> {
        let url = Url::parse(&self.endpoint).map_err(|err| ProviderError::InvalidUrl {
            url: self.endpoint.clone(),
            source: err,
        })?;

        let response = self
            .http
            .post(url)
            .header("X-Goog-Api-Key", &self.api_key)
            .header("X-Goog-FieldMask", FIELD_MASK)
            .json(&self.body(request))
            .send()
            .await
            .map_err(|err| ProviderError::Http(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::UnexpectedStatus {
                status: response.status(),
            });
        }

        let payload: ComputeRoutesResponse = response
            .json()
            .await
            .map_err(|err| ProviderError::Decode(err.to_string()))?;

        Ok(payload.into_outcome(self.traffic_aware))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputeRoutesRequest {
    origin: Waypoint,
    destination: Waypoint,
    travel_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    routing_preference: Option<&'static str>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum Waypoint {
    Address { address: String },
    Location { location: LatLngLocation },
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct LatLngLocation {
    lat_lng: LatLng,
}

#[derive(Debug, Serialize, PartialEq)]
struct LatLng {
    latitude: f64,
    longitude: f64,
}

impl Waypoint {
    fn from_location(location: &str) -> Self {
        match parse_coordinates(location) {
            Some((latitude, longitude)) => Waypoint::Location {
                location: LatLngLocation {
                    lat_lng: LatLng {
                        latitude,
                        longitude,
                    },
                },
            },
            None => Waypoint::Address {
                address: location.to_string(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ComputeRoutesResponse {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteEntry {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    static_duration: Option<String>,
    #[serde(default)]
    distance_meters: Option<f64>,
}

impl ComputeRoutesResponse {
    fn into_outcome(self, traffic_aware: bool) -> RouteOutcome {
        let Some(route) = self.routes.into_iter().next() else {
            return RouteOutcome {
                element_status: Some("ZERO_RESULTS".into()),
                ..RouteOutcome::default()
            };
        };

        let traffic = route.duration.as_deref().and_then(parse_duration);
        let fixed = route.static_duration.as_deref().and_then(parse_duration);
        let duration = if traffic_aware {
            metric(traffic).or(metric(fixed))
        } else {
            metric(fixed).or(metric(traffic))
        };

        RouteOutcome {
            duration_seconds: duration,
            distance_meters: metric(route.distance_meters),
            element_status: Some("OK".into()),
            api_status: None,
        }
    }
}

/// Parses protobuf-style durations such as `"123s"` or `"12.5s"`.
fn parse_duration(raw: &str) -> Option<f64> {
    raw.trim().strip_suffix('s')?.parse().ok()
}
