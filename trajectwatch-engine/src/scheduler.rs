use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use trajectwatch_protocol::{timestamp_now, Direction, Measurement, Snapshot, Traject};

use crate::log::MeasurementLog;
use crate::provider::{RouteProvider, RouteRequest};

/// Owns the timer task of one traject. Dropping the handle does not stop it.
pub struct PollerHandle {
    traject_id: String,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn cancel(&self) {
        self.task.abort();
    }
}

/// Runs one independent poller per traject and keeps the last-known snapshot.
///
/// Every tick issues one forward and one reverse attempt as separate tasks.
/// Attempts never fail: provider errors become `ERROR` measurements and log
/// write errors are reported through `tracing` only.
#[derive(Clone)]
pub struct TrajectScheduler {
    provider: Arc<dyn RouteProvider>,
    log: MeasurementLog,
    snapshots: Arc<RwLock<HashMap<String, Snapshot>>>,
    pollers: Arc<Mutex<HashMap<String, PollerHandle>>>,
}

impl TrajectScheduler {
    pub fn new(provider: Arc<dyn RouteProvider>, log: MeasurementLog) -> Self {
        Self {
            provider,
            log,
            snapshots: Arc::default(),
            pollers: Arc::default(),
        }
    }

    pub fn log(&self) -> &MeasurementLog {
        &self.log
    }

    /// Starts polling `traject`. Returns `false` when a poller for its id is already running.
    pub fn start(&self, traject: &Traject) -> bool {
        let mut pollers = self.pollers.lock();
        if pollers
            .get(&traject.id)
            .is_some_and(PollerHandle::is_running)
        {
            debug!(traject_id = %traject.id, "poller already running");
            return false;
        }

        let traject = Arc::new(traject.clone());
        let scheduler = self.clone();
        let task = tokio::spawn({
            let traject = traject.clone();
            async move { scheduler.poll_loop(traject).await }
        });

        info!(
            traject_id = %traject.id,
            interval_secs = traject.interval().as_secs_f64(),
            "started poller"
        );
        pollers.insert(
            traject.id.clone(),
            PollerHandle {
                traject_id: traject.id.clone(),
                task,
            },
        );
        true
    }

    pub fn is_running(&self, traject_id: &str) -> bool {
        self.pollers
            .lock()
            .get(traject_id)
            .is_some_and(PollerHandle::is_running)
    }

    /// Ids of trajects with a live poller.
    pub fn running(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .pollers
            .lock()
            .values()
            .filter(|handle| handle.is_running())
            .map(|handle| handle.traject_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Last-known measurements for a traject; empty until the first attempt completes.
    pub fn snapshot(&self, traject_id: &str) -> Snapshot {
        self.snapshots
            .read()
            .get(traject_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Stops the poller of one traject. In-flight attempts still complete.
    pub fn cancel(&self, traject_id: &str) -> bool {
        match self.pollers.lock().remove(traject_id) {
            Some(handle) => {
                handle.cancel();
                info!(traject_id, "cancelled poller");
                true
            }
            None => false,
        }
    }

    pub fn shutdown(&self) {
        let pollers: Vec<PollerHandle> = self.pollers.lock().drain().map(|(_, h)| h).collect();
        for handle in &pollers {
            handle.cancel();
        }
        info!(count = pollers.len(), "stopped all pollers");
    }

    /// Runs a single attempt for one direction, appends it and updates the snapshot.
    pub async fn measure(&self, traject: &Traject, direction: Direction) -> Measurement {
        let (origin, destination) = traject.endpoints(direction);
        let request = RouteRequest {
            origin: origin.to_string(),
            destination: destination.to_string(),
            mode: traject.mode,
        };

        let measurement = match self.provider.route(&request).await {
            Ok(outcome) => Measurement {
                timestamp: timestamp_now(),
                status: outcome.status(),
                duration_seconds: outcome.duration_seconds,
                distance_meters: outcome.distance_meters,
                origin: request.origin,
                destination: request.destination,
                mode: traject.mode.as_str().to_string(),
            },
            Err(err) => {
                warn!(
                    traject_id = %traject.id,
                    direction = direction.as_str(),
                    error = %err,
                    "route query failed"
                );
                Measurement::failed(
                    timestamp_now(),
                    request.origin,
                    request.destination,
                    traject.mode.as_str(),
                )
            }
        };

        if let Err(err) = self.log.append(&traject.log_file, &measurement).await {
            error!(
                traject_id = %traject.id,
                direction = direction.as_str(),
                path = %self.log.path_for(&traject.log_file).display(),
                error = %err,
                "failed to append measurement"
            );
        }

        self.snapshots
            .write()
            .entry(traject.id.clone())
            .or_default()
            .set(direction, measurement.clone());

        debug!(
            traject_id = %traject.id,
            direction = direction.as_str(),
            status = %measurement.status,
            "recorded measurement"
        );
        measurement
    }

    async fn poll_loop(self, traject: Arc<Traject>) {
        let mut ticker = time::interval(traject.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            for direction in Direction::BOTH {
                let scheduler = self.clone();
                let traject = traject.clone();
                tokio::spawn(async move {
                    scheduler.measure(&traject, direction).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, RouteOutcome};
    use mockall::mock;
    use std::time::Duration;
    use trajectwatch_protocol::TravelMode;

    mock! {
        pub Provider {}

        #[async_trait::async_trait]
        impl RouteProvider for Provider {
            async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError>;
        }
    }

    fn traject(id: &str, interval_minutes: f64) -> Traject {
        Traject {
            id: id.into(),
            name: "Alpha -> Beta".into(),
            origin: "Alpha".into(),
            destination: "Beta".into(),
            mode: TravelMode::Driving,
            interval_minutes,
            log_file: format!("{id}.csv"),
        }
    }

    fn ok_outcome() -> RouteOutcome {
        RouteOutcome {
            duration_seconds: Some(600),
            distance_meters: Some(5000),
            element_status: Some("OK".into()),
            api_status: Some("OK".into()),
        }
    }

    #[tokio::test]
    async fn measure_records_success_and_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        provider.expect_route().returning(|request| {
            if request.origin == "Alpha" {
                Ok(ok_outcome())
            } else {
                Err(ProviderError::Http("connection reset".into()))
            }
        });

        let scheduler = TrajectScheduler::new(Arc::new(provider), MeasurementLog::new(dir.path()));
        let route = traject("alpha-beta", 5.0);

        let forward = scheduler.measure(&route, Direction::Forward).await;
        assert_eq!(forward.duration_seconds, Some(600));
        assert_eq!(forward.status, "OK");

        let reverse = scheduler.measure(&route, Direction::Reverse).await;
        assert!(reverse.is_error());
        assert_eq!((reverse.origin.as_str(), reverse.destination.as_str()), ("Beta", "Alpha"));

        let snapshot = scheduler.snapshot("alpha-beta");
        assert_eq!(snapshot.forward, Some(forward.clone()));
        assert_eq!(snapshot.reverse, Some(reverse.clone()));

        let logged = scheduler.log().read_all("alpha-beta.csv").await;
        assert_eq!(logged, vec![forward, reverse]);
    }

    #[tokio::test]
    async fn failed_attempt_overwrites_previous_success() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        let mut seq = mockall::Sequence::new();
        provider
            .expect_route()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ok_outcome()));
        provider
            .expect_route()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(ProviderError::Decode("truncated".into())));

        let scheduler = TrajectScheduler::new(Arc::new(provider), MeasurementLog::new(dir.path()));
        let route = traject("r", 5.0);
        scheduler.measure(&route, Direction::Forward).await;
        scheduler.measure(&route, Direction::Forward).await;

        let snapshot = scheduler.snapshot("r");
        assert!(snapshot.forward.is_some_and(|m| m.is_error()));
        assert!(snapshot.reverse.is_none());
    }

    #[tokio::test]
    async fn snapshot_updates_even_when_append_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let mut provider = MockProvider::new();
        provider.expect_route().returning(|_| Ok(ok_outcome()));

        let scheduler = TrajectScheduler::new(Arc::new(provider), MeasurementLog::new(&blocker));
        let route = traject("r", 5.0);
        let measurement = scheduler.measure(&route, Direction::Forward).await;

        assert_eq!(scheduler.snapshot("r").forward, Some(measurement));
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_per_traject() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = MockProvider::new();
        provider.expect_route().returning(|_| Ok(ok_outcome()));

        let scheduler = TrajectScheduler::new(Arc::new(provider), MeasurementLog::new(dir.path()));
        let route = traject("r", 1.0);

        assert!(scheduler.start(&route));
        assert!(!scheduler.start(&route));
        assert!(scheduler.is_running("r"));
        assert_eq!(scheduler.running(), vec!["r".to_string()]);

        assert!(scheduler.cancel("r"));
        assert!(!scheduler.cancel("r"));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(!scheduler.is_running("r"));

        assert!(scheduler.start(&route));
        scheduler.shutdown();
        assert!(scheduler.running().is_empty());
    }
}
