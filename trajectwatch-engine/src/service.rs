use futures::future::join_all;
use tracing::{error, info};
use trajectwatch_core::SeedTraject;
use trajectwatch_protocol::{Snapshot, Traject, TrajectSpec};

use crate::error::EngineError;
use crate::history::{HistoryQuery, HistoryReader, HistoryView};
use crate::log::MeasurementLog;
use crate::scheduler::TrajectScheduler;
use crate::store::{TrajectDefaults, TrajectStore};

/// Ties the store, the scheduler and the history reader together.
#[derive(Clone)]
pub struct TrajectService {
    store: TrajectStore,
    scheduler: TrajectScheduler,
    history: HistoryReader,
}

impl TrajectService {
    pub fn new(store: TrajectStore, scheduler: TrajectScheduler) -> Self {
        let history = HistoryReader::new(scheduler.log().clone());
        Self {
            store,
            scheduler,
            history,
        }
    }

    pub fn scheduler(&self) -> &TrajectScheduler {
        &self.scheduler
    }

    pub fn defaults(&self) -> TrajectDefaults {
        self.store.defaults()
    }

    fn log(&self) -> &MeasurementLog {
        self.history.log()
    }

    pub async fn list(&self) -> Vec<Traject> {
        self.store.list().await
    }

    /// Persists a new traject and starts polling it before returning.
    pub async fn register(&self, spec: TrajectSpec) -> Result<Traject, EngineError> {
        let traject = self.store.register(spec).await?;
        self.prepare_log(&traject).await;
        self.scheduler.start(&traject);
        Ok(traject)
    }

    /// Starts a poller for every stored traject. Returns how many were started.
    pub async fn start_all(&self) -> usize {
        let trajects = self.store.list().await;
        join_all(trajects.iter().map(|traject| self.prepare_log(traject))).await;

        let started = trajects
            .iter()
            .filter(|traject| self.scheduler.start(traject))
            .count();
        info!(started, total = trajects.len(), "pollers started");
        started
    }

    /// Registers `seed` when the store holds no traject yet.
    pub async fn seed_if_empty(&self, seed: &SeedTraject) -> Result<Option<Traject>, EngineError> {
        if !self.store.list().await.is_empty() {
            return Ok(None);
        }
        let spec = TrajectSpec::new(seed.origin.as_str(), seed.destination.as_str());
        let traject = self.store.register(spec).await?;
        info!(traject_id = %traject.id, "seeded traject from configuration");
        Ok(Some(traject))
    }

    /// Resolves `traject_id`, or the first registered traject when absent.
    pub async fn resolve(&self, traject_id: Option<&str>) -> Result<Traject, EngineError> {
        let trajects = self.store.list().await;
        match traject_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => trajects
                .into_iter()
                .find(|traject| traject.id == id)
                .ok_or_else(|| EngineError::TrajectNotFound(id.to_string())),
            None => trajects.into_iter().next().ok_or(EngineError::NoTrajects),
        }
    }

    pub async fn last_known(
        &self,
        traject_id: Option<&str>,
    ) -> Result<(Traject, Snapshot), EngineError> {
        let traject = self.resolve(traject_id).await?;
        let snapshot = self.scheduler.snapshot(&traject.id);
        Ok((traject, snapshot))
    }

    pub async fn history(
        &self,
        traject_id: Option<&str>,
        query: &HistoryQuery,
    ) -> Result<HistoryView, EngineError> {
        let traject = self.resolve(traject_id).await?;
        Ok(self.history.view(&traject, query).await)
    }

    async fn prepare_log(&self, traject: &Traject) {
        if let Err(err) = self.log().ensure(&traject.log_file).await {
            error!(traject_id = %traject.id, error = %err, "failed to create measurement log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{ProviderError, RouteOutcome, RouteProvider, RouteRequest};
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Unreachable;

    #[async_trait]
    impl RouteProvider for Unreachable {
        async fn route(&self, _request: &RouteRequest) -> Result<RouteOutcome, ProviderError> {
            Err(ProviderError::Http("offline".into()))
        }
    }

    fn service(dir: &std::path::Path) -> TrajectService {
        let log = MeasurementLog::new(dir);
        let store = TrajectStore::new(dir.join("trajects.json"), TrajectDefaults::default());
        TrajectService::new(store, TrajectScheduler::new(Arc::new(Unreachable), log))
    }

    #[tokio::test]
    async fn register_creates_log_and_starts_polling() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        let traject = service
            .register(TrajectSpec::new("Alpha", "Beta").id("ab"))
            .await
            .unwrap();

        assert!(service.scheduler().is_running("ab"));
        assert!(dir.path().join(&traject.log_file).exists());
        service.scheduler().shutdown();
    }

    #[tokio::test]
    async fn resolves_first_traject_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());

        assert!(matches!(service.resolve(None).await, Err(EngineError::NoTrajects)));

        service.register(TrajectSpec::new("A", "B").id("first")).await.unwrap();
        service.register(TrajectSpec::new("C", "D").id("second")).await.unwrap();

        assert_eq!(service.resolve(None).await.unwrap().id, "first");
        assert_eq!(service.resolve(Some("second")).await.unwrap().id, "second");
        assert!(matches!(
            service.resolve(Some("nope")).await,
            Err(EngineError::TrajectNotFound(id)) if id == "nope"
        ));
        service.scheduler().shutdown();
    }

    #[tokio::test]
    async fn seeds_only_an_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(dir.path());
        let seed = SeedTraject {
            origin: "Alpha".into(),
            destination: "Beta".into(),
        };

        let seeded = service.seed_if_empty(&seed).await.unwrap();
        assert!(seeded.is_some());
        assert!(service.seed_if_empty(&seed).await.unwrap().is_none());
        assert_eq!(service.list().await.len(), 1);

        assert_eq!(service.start_all().await, 1);
        assert_eq!(service.start_all().await, 0);
        service.scheduler().shutdown();
    }
}
