use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use trajectwatch_protocol::{IntervalInput, TravelMode};

use crate::errors::ConfigError;

const DEFAULT_INTERVAL_MINUTES: f64 = 5.0;
const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Runtime environment used by the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    fn from_str(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "staging" | "stage" => Environment::Staging,
            _ => Environment::Development,
        }
    }
}

/// Which routing API backs the route provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderKind {
    #[default]
    DistanceMatrix,
    Routes,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::DistanceMatrix => "distance_matrix",
            ProviderKind::Routes => "routes",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "distance_matrix" | "distancematrix" | "legacy" => Ok(ProviderKind::DistanceMatrix),
            "routes" | "compute_routes" => Ok(ProviderKind::Routes),
            other => Err(ConfigError::InvalidValue {
                key: "TRAJECTWATCH_PROVIDER".into(),
                message: format!("unknown provider {other:?}"),
            }),
        }
    }
}

/// Traject registered at startup when the store is still empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedTraject {
    pub origin: String,
    pub destination: String,
}

/// Process configuration for the poller and its query API.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub http_bind: String,
    pub data_dir: PathBuf,
    pub public_dir: Option<PathBuf>,
    pub api_key: Option<String>,
    pub provider: ProviderKind,
    pub traffic_aware: bool,
    pub default_mode: TravelMode,
    pub default_interval_minutes: f64,
    pub seed: Option<SeedTraject>,
    pub environment: Environment,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            http_bind: DEFAULT_BIND.to_string(),
            data_dir: PathBuf::from("data"),
            public_dir: None,
            api_key: None,
            provider: ProviderKind::default(),
            traffic_aware: true,
            default_mode: TravelMode::default(),
            default_interval_minutes: DEFAULT_INTERVAL_MINUTES,
            seed: None,
            environment: Environment::default(),
        }
    }
}

impl WatchConfig {
    /// Loads configuration from the process environment (and a `.env` file if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let http_bind = read("TRAJECTWATCH_HTTP_BIND")
            .or_else(|| read("PORT").map(|port| format!("0.0.0.0:{port}")))
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let data_dir = read("TRAJECTWATCH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"));
        let public_dir = read("TRAJECTWATCH_PUBLIC_DIR").map(PathBuf::from);

        let api_key = read("TRAJECTWATCH_API_KEY").or_else(|| read("GOOGLE_MAPS_API_KEY"));

        let provider = read("TRAJECTWATCH_PROVIDER")
            .map(|raw| raw.parse())
            .transpose()?
            .unwrap_or_default();

        let traffic_aware = read("TRAJECTWATCH_TRAFFIC_AWARE")
            .map(|raw| parse_bool("TRAJECTWATCH_TRAFFIC_AWARE", &raw))
            .transpose()?
            .unwrap_or(true);

        let default_mode = read("TRAJECTWATCH_DEFAULT_MODE")
            .map(|raw| {
                raw.parse::<TravelMode>()
                    .map_err(|err| ConfigError::InvalidValue {
                        key: "TRAJECTWATCH_DEFAULT_MODE".into(),
                        message: err.to_string(),
                    })
            })
            .transpose()?
            .unwrap_or_default();

        // Mirrors registration: an unusable interval silently falls back.
        let default_interval_minutes = read("TRAJECTWATCH_DEFAULT_INTERVAL_MINUTES")
            .and_then(|raw| IntervalInput::Text(raw).coerce())
            .unwrap_or(DEFAULT_INTERVAL_MINUTES);

        let seed = match (read("TRAJECTWATCH_ORIGIN"), read("TRAJECTWATCH_DESTINATION")) {
            (Some(origin), Some(destination)) => Some(SeedTraject {
                origin,
                destination,
            }),
            (None, None) => None,
            _ => {
                return Err(ConfigError::Internal(
                    "TRAJECTWATCH_ORIGIN and TRAJECTWATCH_DESTINATION must be set together"
                        .into(),
                ))
            }
        };

        let environment = read("TRAJECTWATCH_ENV")
            .map(|raw| Environment::from_str(&raw))
            .unwrap_or_default();

        Ok(Self {
            http_bind,
            data_dir,
            public_dir,
            api_key,
            provider,
            traffic_aware,
            default_mode,
            default_interval_minutes,
            seed,
            environment,
        })
    }

    /// Returns the API key or the error the HTTP providers need to report.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnvVar("TRAJECTWATCH_API_KEY".into()))
    }

    /// Location of the traject store document.
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join("trajects.json")
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
