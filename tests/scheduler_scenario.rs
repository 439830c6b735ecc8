// Poller behaviour under a simulated clock: tick cadence, failure handling and the
// resulting measurement history.
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mockall::mock;
use parking_lot::Mutex;
use trajectwatch_engine::{
    HistoryQuery, HistoryView, MeasurementLog, ProviderError, RouteOutcome, RouteProvider,
    RouteRequest, TrajectDefaults, TrajectScheduler, TrajectService, TrajectStore,
};
use trajectwatch_protocol::TrajectSpec;

mock! {
    pub Provider {}

    #[async_trait::async_trait]
    impl RouteProvider for Provider {
        async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError>;
    }
}

/// Counts calls per origin and always answers with a fixed route.
#[derive(Default)]
struct CountingProvider {
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingProvider {
    fn calls_from(&self, origin: &str) -> usize {
        self.calls.lock().get(origin).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl RouteProvider for CountingProvider {
    async fn route(&self, request: &RouteRequest) -> Result<RouteOutcome, ProviderError> {
        *self.calls.lock().entry(request.origin.clone()).or_default() += 1;
        Ok(RouteOutcome {
            duration_seconds: Some(300),
            distance_meters: Some(1200),
            element_status: Some("OK".into()),
            api_status: Some("OK".into()),
        })
    }
}

fn service(dir: &Path, provider: Arc<dyn RouteProvider>) -> TrajectService {
    let store = TrajectStore::new(dir.join("trajects.json"), TrajectDefaults::default());
    let scheduler = TrajectScheduler::new(provider, MeasurementLog::new(dir));
    TrajectService::new(store, scheduler)
}

/// Waits without advancing the paused clock until the log holds `expected` records.
async fn settle(service: &TrajectService, traject_id: &str, expected: usize) -> HistoryView {
    let query = HistoryQuery::default();
    for _ in 0..500 {
        let view = service
            .history(Some(traject_id), &query)
            .await
            .expect("traject exists");
        if view.records.len() >= expected {
            return view;
        }
        std::thread::sleep(Duration::from_millis(2));
        tokio::task::yield_now().await;
    }
    service
        .history(Some(traject_id), &query)
        .await
        .expect("traject exists")
}

#[tokio::test(start_paused = true)]
async fn alpha_beta_records_two_ticks_of_mixed_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let mut provider = MockProvider::new();
    provider.expect_route().returning(|request| {
        if request.origin == "Alpha" {
            Ok(RouteOutcome {
                duration_seconds: Some(600),
                distance_meters: Some(5000),
                element_status: Some("OK".into()),
                api_status: Some("OK".into()),
            })
        } else {
            Err(ProviderError::Http("connection refused".into()))
        }
    });

    let service = service(dir.path(), Arc::new(provider));
    let traject = service
        .register(TrajectSpec::new("Alpha", "Beta").interval_minutes(1.0))
        .await
        .expect("registration succeeds");
    assert!(service.scheduler().is_running(&traject.id));

    tokio::time::sleep(Duration::from_secs(61)).await;
    let view = settle(&service, &traject.id, 4).await;

    assert_eq!(view.records.len(), 4);
    assert_eq!(view.forward.len(), 2);
    assert!(view
        .forward
        .iter()
        .all(|m| m.duration_seconds == Some(600) && m.distance_meters == Some(5000)));
    assert_eq!(view.reverse.len(), 2);
    assert!(view
        .reverse
        .iter()
        .all(|m| m.status == "ERROR" && m.duration_seconds.is_none()));

    let raw = std::fs::read_to_string(dir.path().join(&traject.log_file)).unwrap();
    let error_rows: Vec<&str> = raw.lines().filter(|line| line.contains(",ERROR,")).collect();
    assert_eq!(error_rows.len(), 2);
    assert!(error_rows.iter().all(|line| line.contains("Z,,,ERROR,Beta,Alpha,driving")));

    let (_, snapshot) = service.last_known(Some(traject.id.as_str())).await.unwrap();
    assert_eq!(snapshot.forward.and_then(|m| m.duration_seconds), Some(600));
    assert!(snapshot.reverse.is_some_and(|m| m.is_error()));

    service.scheduler().shutdown();
}

#[tokio::test(start_paused = true)]
async fn trajects_tick_on_their_own_interval() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(CountingProvider::default());
    let service = service(dir.path(), provider.clone());

    service
        .register(TrajectSpec::new("Fast", "X").interval_minutes(1.0))
        .await
        .unwrap();
    service
        .register(TrajectSpec::new("Slow", "Y").interval_minutes(5.0))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(provider.calls_from("Fast"), 3);
    assert_eq!(provider.calls_from("X"), 3);
    assert_eq!(provider.calls_from("Slow"), 1);
    assert_eq!(provider.calls_from("Y"), 1);

    tokio::time::sleep(Duration::from_secs(160)).await;
    assert_eq!(provider.calls_from("Fast"), 6);
    assert_eq!(provider.calls_from("Slow"), 2);

    service.scheduler().shutdown();
}

#[tokio::test(start_paused = true)]
async fn failing_provider_never_stops_the_poller() {
    let dir = tempfile::tempdir().unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut provider = MockProvider::new();
    provider.expect_route().returning({
        let calls = calls.clone();
        move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Decode("unexpected end of input".into()))
        }
    });

    let service = service(dir.path(), Arc::new(provider));
    let traject = service
        .register(TrajectSpec::new("Alpha", "Beta").id("flaky").interval_minutes(1.0))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(125)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 6);
    assert!(service.scheduler().is_running("flaky"));

    let view = settle(&service, &traject.id, 6).await;
    assert_eq!(view.records.len(), 6);
    assert!(view.records.iter().all(|m| m.is_error()));

    service.scheduler().shutdown();
}
