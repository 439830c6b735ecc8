use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use trajectwatch_core::WatchError;
use trajectwatch_protocol::Measurement;

use crate::csv;

type FileGate = Arc<tokio::sync::Mutex<()>>;

/// Append-only measurement logs, one CSV file per traject under a data directory.
///
/// Appends and reads on the same file are serialised through a per-file gate,
/// so a reader never observes half of a record and concurrent writers never
/// interleave their bytes.
#[derive(Clone)]
pub struct MeasurementLog {
    dir: PathBuf,
    gates: Arc<Mutex<HashMap<PathBuf, FileGate>>>,
}

impl MeasurementLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            gates: Arc::default(),
        }
    }

    pub fn path_for(&self, log_file: &str) -> PathBuf {
        self.dir.join(log_file)
    }

    fn gate(&self, path: &Path) -> FileGate {
        self.gates
            .lock()
            .entry(path.to_path_buf())
            .or_default()
            .clone()
    }

    /// Creates the log with its header line. No-op when the file already exists.
    pub async fn ensure(&self, log_file: &str) -> Result<(), WatchError> {
        let path = self.path_for(log_file);
        let gate = self.gate(&path);
        let _guard = gate.lock().await;
        self.ensure_locked(&path).await
    }

    async fn ensure_locked(&self, path: &Path) -> Result<(), WatchError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                file.write_all(csv::header_line().as_bytes()).await?;
                file.sync_data().await?;
                debug!(path = %path.display(), "created measurement log");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Appends one record, creating the log first if needed.
    pub async fn append(&self, log_file: &str, measurement: &Measurement) -> Result<(), WatchError> {
        let path = self.path_for(log_file);
        let gate = self.gate(&path);
        let _guard = gate.lock().await;

        self.ensure_locked(&path).await?;

        let line = csv::encode_measurement(measurement);
        let mut file = OpenOptions::new().append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Every record in append order. Missing or malformed logs read as empty.
    pub async fn read_all(&self, log_file: &str) -> Vec<Measurement> {
        let path = self.path_for(log_file);
        let gate = self.gate(&path);
        let raw = {
            let _guard = gate.lock().await;
            fs::read_to_string(&path).await
        };

        let raw = match raw {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read measurement log");
                return Vec::new();
            }
        };

        match csv::decode_measurements(&raw) {
            Ok(measurements) => measurements,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "measurement log is malformed");
                Vec::new()
            }
        }
    }
}
