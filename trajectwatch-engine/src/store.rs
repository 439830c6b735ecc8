use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};
use trajectwatch_core::{WatchConfig, WatchError};
use trajectwatch_protocol::{IntervalInput, Traject, TrajectSpec, TravelMode, ValidationError};
use uuid::Uuid;

use crate::error::EngineError;

/// Process-wide fallbacks applied to partial registrations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectDefaults {
    pub mode: TravelMode,
    pub interval_minutes: f64,
}

impl Default for TrajectDefaults {
    fn default() -> Self {
        Self {
            mode: TravelMode::Driving,
            interval_minutes: 5.0,
        }
    }
}

impl From<&WatchConfig> for TrajectDefaults {
    fn from(config: &WatchConfig) -> Self {
        Self {
            mode: config.default_mode,
            interval_minutes: config.default_interval_minutes,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    trajects: Vec<Traject>,
}

/// Durable, ordered registry of trajects backed by a single JSON document.
///
/// The document is rewritten as a whole on every registration and replaced
/// atomically, so a registration is durable before it is acknowledged.
#[derive(Clone)]
pub struct TrajectStore {
    path: PathBuf,
    defaults: TrajectDefaults,
    write_lock: Arc<Mutex<()>>,
}

impl TrajectStore {
    pub fn new(path: impl Into<PathBuf>, defaults: TrajectDefaults) -> Self {
        Self {
            path: path.into(),
            defaults,
            write_lock: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> TrajectDefaults {
        self.defaults
    }

    /// Trajects in registration order. An unreadable store reads as empty.
    pub async fn list(&self) -> Vec<Traject> {
        match self.load().await {
            Ok(trajects) => trajects,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "traject store unreadable, serving empty list");
                Vec::new()
            }
        }
    }

    /// Validates `spec`, persists the resolved traject and returns it.
    pub async fn register(&self, spec: TrajectSpec) -> Result<Traject, EngineError> {
        let _guard = self.write_lock.lock().await;

        let mut trajects = self.load().await?;
        let traject = resolve(spec, &trajects, self.defaults)?;
        trajects.push(traject.clone());
        self.persist(&trajects).await?;

        info!(traject_id = %traject.id, origin = %traject.origin, destination = %traject.destination, "registered traject");
        Ok(traject)
    }

    async fn load(&self) -> Result<Vec<Traject>, WatchError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(WatchError::StorageError(format!(
                    "failed to read {}: {err}",
                    self.path.display()
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let document: StoreDocument = serde_json::from_str(&raw).map_err(|err| {
            WatchError::DeserializationError(format!("{}: {err}", self.path.display()))
        })?;
        Ok(document
            .trajects
            .into_iter()
            .map(|traject| repair(traject, self.defaults))
            .collect())
    }

    async fn persist(&self, trajects: &[Traject]) -> Result<(), WatchError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let document = StoreDocument {
            trajects: trajects.to_vec(),
        };
        let body = serde_json::to_string_pretty(&document).map_err(|err| {
            WatchError::SerializationError(format!("{}: {err}", self.path.display()))
        })?;

        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(body.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn resolve(
    spec: TrajectSpec,
    existing: &[Traject],
    defaults: TrajectDefaults,
) -> Result<Traject, ValidationError> {
    let origin = spec
        .origin
        .as_ref()
        .ok_or(ValidationError::MissingLocation { field: "origin" })?
        .normalize("origin")?;
    let destination = spec
        .destination
        .as_ref()
        .ok_or(ValidationError::MissingLocation {
            field: "destination",
        })?
        .normalize("destination")?;
    if origin == destination {
        return Err(ValidationError::SameEndpoints(origin));
    }

    let taken = |id: &str| existing.iter().any(|traject| traject.id == id);
    let id = match spec.id.as_deref().map(sanitize_id).filter(|id| !id.is_empty()) {
        Some(id) if taken(id.as_str()) => return Err(ValidationError::DuplicateId(id)),
        Some(id) => id,
        None => loop {
            let candidate = Uuid::new_v4().simple().to_string();
            if !taken(candidate.as_str()) {
                break candidate;
            }
        },
    };

    let interval_minutes = spec
        .interval_minutes
        .as_ref()
        .and_then(|interval| interval.coerce())
        .unwrap_or(defaults.interval_minutes);

    let mode = match spec.mode.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => raw.parse::<TravelMode>()?,
        _ => defaults.mode,
    };

    let name = spec
        .name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{origin} -> {destination}"));

    let log_taken = |file: &str| {
        existing
            .iter()
            .any(|traject| traject.log_file.eq_ignore_ascii_case(file))
    };
    let log_file = match spec.log_file.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => {
            let file = sanitize_file_name(raw);
            if !is_log_file_name(&file) {
                return Err(ValidationError::InvalidLogFile(raw.to_string()));
            }
            if log_taken(&file) {
                return Err(ValidationError::DuplicateLogFile(file));
            }
            file
        }
        None => {
            let derived = format!("{id}.csv");
            if log_taken(&derived) {
                format!("{id}-{}.csv", Uuid::new_v4().simple())
            } else {
                derived
            }
        }
    };

    Ok(Traject {
        id,
        name,
        origin,
        destination,
        mode,
        interval_minutes,
        log_file,
    })
}

/// Applies defaults to hand-edited records with an unusable interval or log file.
fn repair(mut traject: Traject, defaults: TrajectDefaults) -> Traject {
    if IntervalInput::Number(traject.interval_minutes).coerce().is_none() {
        warn!(traject_id = %traject.id, "stored interval invalid, using default");
        traject.interval_minutes = defaults.interval_minutes;
    }
    let log_file = sanitize_file_name(&traject.log_file);
    traject.log_file = if !is_log_file_name(&log_file) {
        warn!(traject_id = %traject.id, log_file = %traject.log_file, "stored log file invalid, using default");
        format!("{}.csv", sanitize_id(&traject.id))
    } else {
        log_file
    };
    traject
}

/// Maps an arbitrary identifier onto `[A-Za-z0-9_-]+`.
///
/// Runs of other characters collapse into a single `-`; leading and trailing
/// dashes are removed. May return an empty string.
pub fn sanitize_id(raw: &str) -> String {
    let mut id = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' || ch == '-' {
            id.push(ch);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_matches('-').to_string()
}

/// Log files are `.csv` files so they never collide with the store document.
fn is_log_file_name(name: &str) -> bool {
    name.len() > ".csv".len() && name.to_ascii_lowercase().ends_with(".csv")
}

fn sanitize_file_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '-' | '.'))
        .collect();
    name.trim_start_matches('.').to_string()
}
