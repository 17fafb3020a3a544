//! Refresh coordination.
//!
//! Launch, timer, manual and city-change triggers all funnel into one
//! mutex-guarded routine that gates on connectivity, keeps at most one tracked
//! fetch in flight and publishes every `RefreshState` transition. Fetches run
//! on the runtime; their completion re-enters the same lock before touching
//! state. A completion is applied only if its `RequestToken` is still the
//! tracked one, so results for a superseded city are dropped without having
//! to abort the request.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use stratus_weather::{ConnectivityChecker, FetchError, Location, WeatherClient, WeatherSnapshot};

use crate::state::{FailureReason, RefreshState};
use crate::subscription::{StateSubscription, Subscribers};

/// Where a refresh request came from. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    Launch,
    Periodic,
    Manual,
    LocationChanged,
}

/// Identity of one issued fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestToken {
    generation: u64,
    location: Location,
}

struct Inner {
    started: bool,
    location: Option<Location>,
    /// Bumped on every city change; tokens from older generations are stale
    generation: u64,
    in_flight: Option<RequestToken>,
    state: RefreshState,
    last_updated: Option<DateTime<Utc>>,
    subscribers: Subscribers,
}

impl Inner {
    fn transition(&mut self, state: RefreshState) {
        self.state = state;
        self.subscribers.publish(&self.state);
    }
}

struct Shared {
    client: Arc<dyn WeatherClient>,
    connectivity: Arc<dyn ConnectivityChecker>,
    runtime: Handle,
    inner: Mutex<Inner>,
}

/// Cheap-to-clone handle; all clones drive the same coordinator.
#[derive(Clone)]
pub struct RefreshCoordinator {
    shared: Arc<Shared>,
}

impl RefreshCoordinator {
    pub fn new(
        client: Arc<dyn WeatherClient>,
        connectivity: Arc<dyn ConnectivityChecker>,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                client,
                connectivity,
                runtime,
                inner: Mutex::new(Inner {
                    started: false,
                    location: None,
                    generation: 0,
                    in_flight: None,
                    state: RefreshState::Idle,
                    last_updated: None,
                    subscribers: Subscribers::default(),
                }),
            }),
        }
    }

    /// Begin the session with `initial` and run the first refresh.
    /// Calling it again has no effect.
    pub fn start(&self, initial: Location) {
        let mut inner = self.shared.inner.lock();
        if inner.started {
            tracing::debug!("Coordinator already started, ignoring start({})", initial);
            return;
        }

        tracing::info!("Starting weather refresh for {}", initial);
        inner.started = true;
        inner.location = Some(initial);
        self.evaluate(&mut inner, TriggerSource::Launch);
    }

    /// Timer tick or manual refresh. Never blocks; the outcome arrives as a
    /// state transition.
    pub fn on_trigger(&self, source: TriggerSource) {
        let mut inner = self.shared.inner.lock();
        if !inner.started {
            tracing::debug!("Ignoring {:?} trigger before start", source);
            return;
        }
        self.evaluate(&mut inner, source);
    }

    /// Switch to `location`, forget any in-flight fetch for the previous one
    /// and refresh immediately.
    pub fn on_location_changed(&self, location: Location) {
        let mut inner = self.shared.inner.lock();

        tracing::info!("Location changed to {}", location);
        inner.location = Some(location);
        inner.generation += 1;
        if let Some(superseded) = inner.in_flight.take() {
            tracing::debug!(
                "Dropping interest in in-flight fetch for {}",
                superseded.location
            );
        }

        if !inner.started {
            return;
        }
        self.evaluate(&mut inner, TriggerSource::LocationChanged);
    }

    /// Completion callback for a fetch issued by this coordinator.
    ///
    /// Results whose token is no longer the tracked request are discarded.
    pub fn on_fetch_completed(
        &self,
        result: Result<WeatherSnapshot, FetchError>,
        token: RequestToken,
    ) {
        let mut inner = self.shared.inner.lock();

        if inner.in_flight.as_ref() != Some(&token) {
            tracing::debug!(
                "Discarding stale result for {} (generation {}, current {})",
                token.location,
                token.generation,
                inner.generation
            );
            return;
        }
        inner.in_flight = None;

        match result {
            Ok(snapshot) => {
                tracing::info!(
                    "Weather for {} updated: {:.1}, {}",
                    token.location,
                    snapshot.temperature,
                    snapshot.description
                );
                inner.last_updated = Some(Utc::now());
                inner.transition(RefreshState::Loaded(snapshot));
            }
            Err(e) => {
                let reason = FailureReason::from(e);
                tracing::error!(
                    "Weather fetch for {} failed ({}): {}",
                    token.location,
                    reason.kind(),
                    reason
                );
                inner.transition(RefreshState::Failed(reason));
            }
        }
    }

    /// Subscribe to every future state transition.
    pub fn subscribe(&self) -> StateSubscription {
        self.shared.inner.lock().subscribers.subscribe()
    }

    pub fn state(&self) -> RefreshState {
        self.shared.inner.lock().state.clone()
    }

    pub fn location(&self) -> Option<Location> {
        self.shared.inner.lock().location.clone()
    }

    /// When the last successful fetch was applied
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.shared.inner.lock().last_updated
    }

    #[cfg(test)]
    fn in_flight(&self) -> Option<RequestToken> {
        self.shared.inner.lock().in_flight.clone()
    }

    pub fn is_fetch_in_flight(&self) -> bool {
        self.shared.inner.lock().in_flight.is_some()
    }

    /// Trigger-handling routine. Caller holds the lock.
    fn evaluate(&self, inner: &mut Inner, source: TriggerSource) {
        if !self.shared.connectivity.is_online() {
            tracing::info!("{:?} refresh skipped: no network", source);
            inner.transition(RefreshState::Failed(FailureReason::NoNetwork));
            return;
        }

        if let Some(pending) = &inner.in_flight {
            tracing::debug!(
                "{:?} refresh coalesced into in-flight fetch for {}",
                source,
                pending.location
            );
            return;
        }

        let Some(location) = inner.location.clone() else {
            tracing::warn!("{:?} refresh with no location selected", source);
            return;
        };

        tracing::debug!("{:?} refresh: fetching weather for {}", source, location);
        let token = RequestToken {
            generation: inner.generation,
            location,
        };
        inner.in_flight = Some(token.clone());
        inner.transition(RefreshState::Loading);
        self.spawn_fetch(token);
    }

    fn spawn_fetch(&self, token: RequestToken) {
        let client = Arc::clone(&self.shared.client);
        let location = token.location.clone();
        let fetch = self
            .shared
            .runtime
            .spawn(async move { client.fetch(&location).await });

        // Awaiting the handle turns a panicking client into an ordinary failure
        let coordinator = self.clone();
        self.shared.runtime.spawn(async move {
            let result = match fetch.await {
                Ok(result) => result,
                Err(e) => Err(FetchError::Transport(format!("fetch task failed: {}", e))),
            };
            coordinator.on_fetch_completed(result, token);
        });
    }
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("RefreshCoordinator")
            .field("started", &inner.started)
            .field("location", &inner.location)
            .field("generation", &inner.generation)
            .field("in_flight", &inner.in_flight)
            .field("state", &inner.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::oneshot;

    type Reply = oneshot::Sender<Result<WeatherSnapshot, FetchError>>;

    /// Client whose fetches stay pending until the test resolves them.
    #[derive(Default)]
    struct ScriptedClient {
        calls: Mutex<Vec<Location>>,
        pending: Mutex<Vec<(Location, Reply)>>,
        panic_next: AtomicBool,
    }

    impl ScriptedClient {
        fn call_count(&self) -> usize {
            self.calls.lock().len()
        }

        fn pending_count(&self) -> usize {
            self.pending.lock().len()
        }

        fn resolve(&self, city: &str, result: Result<WeatherSnapshot, FetchError>) {
            let mut pending = self.pending.lock();
            let index = pending
                .iter()
                .position(|(loc, _)| loc.as_str() == city)
                .unwrap();
            let (_, reply) = pending.remove(index);
            let _ = reply.send(result);
        }
    }

    #[async_trait]
    impl WeatherClient for ScriptedClient {
        async fn fetch(&self, location: &Location) -> Result<WeatherSnapshot, FetchError> {
            self.calls.lock().push(location.clone());
            if self.panic_next.swap(false, Ordering::SeqCst) {
                panic!("client blew up");
            }
            let (tx, rx) = oneshot::channel();
            self.pending.lock().push((location.clone(), tx));
            rx.await
                .unwrap_or_else(|_| Err(FetchError::Transport("reply dropped".into())))
        }
    }

    struct FlagConnectivity(AtomicBool);

    impl FlagConnectivity {
        fn new(online: bool) -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(online)))
        }

        fn set(&self, online: bool) {
            self.0.store(online, Ordering::SeqCst);
        }
    }

    impl ConnectivityChecker for FlagConnectivity {
        fn is_online(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn loc(city: &str) -> Location {
        Location::parse(city).unwrap()
    }

    fn snapshot(city: &str, temperature: f64) -> WeatherSnapshot {
        WeatherSnapshot {
            location: loc(city),
            temperature,
            temp_min: temperature - 3.5,
            temp_max: temperature + 2.5,
            description: "Clear".to_string(),
            icon: "01d".to_string(),
            retrieved_at: Utc::now(),
        }
    }

    fn setup(online: bool) -> (RefreshCoordinator, Arc<ScriptedClient>, Arc<FlagConnectivity>) {
        let client = Arc::new(ScriptedClient::default());
        let connectivity = FlagConnectivity::new(online);
        let coordinator =
            RefreshCoordinator::new(client.clone(), connectivity.clone(), Handle::current());
        (coordinator, client, connectivity)
    }

    /// Let spawned fetch and completion tasks run until `done` holds.
    async fn settle(done: impl Fn() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::task::yield_now().await;
        }
        assert!(done(), "condition not reached");
    }

    #[tokio::test]
    async fn test_paris_scenario_loads_exact_fields() {
        let (coordinator, client, _) = setup(true);
        let mut states = coordinator.subscribe();

        coordinator.start(loc("Paris"));
        assert_eq!(coordinator.state(), RefreshState::Loading);
        settle(|| client.pending_count() == 1).await;

        let expected = WeatherSnapshot {
            location: loc("Paris"),
            temperature: 18.5,
            temp_min: 15.0,
            temp_max: 21.0,
            description: "Clear".to_string(),
            icon: "01d".to_string(),
            retrieved_at: Utc::now(),
        };
        client.resolve("Paris", Ok(expected.clone()));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        assert_eq!(coordinator.state(), RefreshState::Loaded(expected.clone()));
        assert!(coordinator.last_updated().is_some());
        assert_eq!(
            states.drain(),
            vec![RefreshState::Loading, RefreshState::Loaded(expected)]
        );
    }

    #[tokio::test]
    async fn test_offline_trigger_fails_without_fetching() {
        let (coordinator, client, connectivity) = setup(true);
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;
        client.resolve("Paris", Ok(snapshot("Paris", 18.5)));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        connectivity.set(false);
        coordinator.on_trigger(TriggerSource::Periodic);

        assert_eq!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::NoNetwork)
        );
        assert_eq!(coordinator.location(), Some(loc("Paris")));
        tokio::task::yield_now().await;
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_trigger_keeps_in_flight_fetch() {
        let (coordinator, client, connectivity) = setup(true);
        let mut states = coordinator.subscribe();
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;

        connectivity.set(false);
        coordinator.on_trigger(TriggerSource::Periodic);
        assert!(coordinator.is_fetch_in_flight());

        // Back online, but the tracked fetch absorbs the manual trigger
        connectivity.set(true);
        coordinator.on_trigger(TriggerSource::Manual);
        assert_eq!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::NoNetwork)
        );

        let paris = snapshot("Paris", 18.5);
        client.resolve("Paris", Ok(paris.clone()));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        assert_eq!(
            states.drain(),
            vec![
                RefreshState::Loading,
                RefreshState::Failed(FailureReason::NoNetwork),
                RefreshState::Loaded(paris),
            ]
        );
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_offline_at_start_then_recovers_on_next_trigger() {
        let (coordinator, client, connectivity) = setup(false);

        coordinator.start(loc("Paris"));
        assert_eq!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::NoNetwork)
        );
        assert!(!coordinator.is_fetch_in_flight());

        connectivity.set(true);
        coordinator.on_trigger(TriggerSource::Periodic);
        assert_eq!(coordinator.state(), RefreshState::Loading);
        settle(|| client.call_count() == 1).await;
    }

    #[tokio::test]
    async fn test_triggers_during_fetch_are_coalesced() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));

        coordinator.on_trigger(TriggerSource::Periodic);
        coordinator.on_trigger(TriggerSource::Manual);
        settle(|| client.pending_count() == 1).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_trigger_after_completion_fetches_again() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;
        client.resolve("Paris", Ok(snapshot("Paris", 18.5)));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        coordinator.on_trigger(TriggerSource::Manual);
        settle(|| client.call_count() == 2).await;
        assert_eq!(coordinator.state(), RefreshState::Loading);
    }

    #[tokio::test]
    async fn test_late_result_for_previous_location_is_ignored() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;

        coordinator.on_location_changed(loc("Tokyo"));
        settle(|| client.pending_count() == 2).await;

        client.resolve("Paris", Ok(snapshot("Paris", 18.5)));
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.state(), RefreshState::Loading);
        assert!(coordinator.last_updated().is_none());

        let tokyo = snapshot("Tokyo", 24.0);
        client.resolve("Tokyo", Ok(tokyo.clone()));
        settle(|| !coordinator.is_fetch_in_flight()).await;
        assert_eq!(coordinator.state(), RefreshState::Loaded(tokyo));
    }

    #[tokio::test]
    async fn test_late_result_after_new_location_loaded_is_ignored() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;

        coordinator.on_location_changed(loc("Tokyo"));
        settle(|| client.pending_count() == 2).await;

        let tokyo = snapshot("Tokyo", 24.0);
        client.resolve("Tokyo", Ok(tokyo.clone()));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        client.resolve("Paris", Err(FetchError::Parse("late".into())));
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.state(), RefreshState::Loaded(tokyo));
    }

    #[tokio::test]
    async fn test_stale_token_never_changes_state() {
        let (coordinator, _client, _) = setup(true);
        coordinator.start(loc("Paris"));
        let paris_token = coordinator.in_flight().unwrap();

        coordinator.on_location_changed(loc("Paris"));
        assert_ne!(coordinator.in_flight(), Some(paris_token.clone()));

        coordinator.on_fetch_completed(Ok(snapshot("Paris", 1.0)), paris_token);
        assert_eq!(coordinator.state(), RefreshState::Loading);
        assert!(coordinator.is_fetch_in_flight());
    }

    #[tokio::test]
    async fn test_trigger_before_start_is_ignored() {
        let (coordinator, client, _) = setup(true);
        let mut states = coordinator.subscribe();

        coordinator.on_trigger(TriggerSource::Manual);
        coordinator.on_location_changed(loc("Lima"));
        tokio::task::yield_now().await;

        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.location(), Some(loc("Lima")));
        assert_eq!(client.call_count(), 0);
        assert!(states.try_next().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_is_noop() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));
        coordinator.start(loc("Berlin"));
        settle(|| client.call_count() == 1).await;

        assert_eq!(coordinator.location(), Some(loc("Paris")));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_is_reported_and_recoverable() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Atlantis"));
        settle(|| client.pending_count() == 1).await;

        client.resolve(
            "Atlantis",
            Err(FetchError::Status {
                status: 404,
                message: "city not found".into(),
            }),
        );
        settle(|| !coordinator.is_fetch_in_flight()).await;
        assert_eq!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::ProviderError {
                status: Some(404),
                message: "city not found".into()
            })
        );

        coordinator.on_trigger(TriggerSource::Manual);
        settle(|| client.call_count() == 2).await;
    }

    #[tokio::test]
    async fn test_parse_error_is_reported() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));
        settle(|| client.pending_count() == 1).await;

        client.resolve("Paris", Err(FetchError::Parse("missing field `main`".into())));
        settle(|| !coordinator.is_fetch_in_flight()).await;

        assert!(matches!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::ParseError(_))
        ));
    }

    #[tokio::test]
    async fn test_panicking_client_becomes_failure() {
        let (coordinator, client, _) = setup(true);
        client.panic_next.store(true, Ordering::SeqCst);

        coordinator.start(loc("Paris"));
        settle(|| !coordinator.is_fetch_in_flight()).await;
        assert!(matches!(
            coordinator.state(),
            RefreshState::Failed(FailureReason::ProviderError { status: None, .. })
        ));

        coordinator.on_trigger(TriggerSource::Manual);
        settle(|| client.pending_count() == 1).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_issue_single_fetch() {
        let (coordinator, client, _) = setup(true);
        coordinator.start(loc("Paris"));

        std::thread::scope(|scope| {
            for i in 0..16 {
                let coordinator = coordinator.clone();
                scope.spawn(move || {
                    let source = if i % 2 == 0 {
                        TriggerSource::Periodic
                    } else {
                        TriggerSource::Manual
                    };
                    coordinator.on_trigger(source);
                });
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(client.call_count(), 1);
        assert!(coordinator.is_fetch_in_flight());
    }
}
