//! One active weather view: coordinator, scheduler and settings wired together.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use stratus_weather::{ConnectivityChecker, Location, SettingsError, SettingsStore, WeatherClient};

use crate::coordinator::{RefreshCoordinator, TriggerSource};
use crate::schedule_store::ScheduleStore;
use crate::scheduler::RefreshScheduler;
use crate::state::RefreshState;
use crate::subscription::StateSubscription;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to save location: {0}")]
    Settings(#[from] SettingsError),
}

/// Collaborators a session is built from.
pub struct SessionDeps {
    pub client: Arc<dyn WeatherClient>,
    pub connectivity: Arc<dyn ConnectivityChecker>,
    pub settings: Arc<dyn SettingsStore>,
    pub schedule: Arc<dyn ScheduleStore>,
    pub runtime: Handle,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Used when the settings store has no city yet
    pub default_location: Location,
    pub refresh_interval: Duration,
}

pub struct WeatherSession {
    coordinator: RefreshCoordinator,
    scheduler: RefreshScheduler,
    settings: Arc<dyn SettingsStore>,
    pump: JoinHandle<()>,
    closed: bool,
}

impl WeatherSession {
    /// Load the saved city, run the first refresh and arm periodic refreshes.
    pub fn open(deps: SessionDeps, options: SessionOptions) -> Self {
        let location = match deps.settings.location() {
            Ok(Some(location)) => location,
            Ok(None) => {
                tracing::info!(
                    "No saved city, using default {}",
                    options.default_location
                );
                options.default_location
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read saved city ({}), using default {}",
                    e,
                    options.default_location
                );
                options.default_location
            }
        };

        let coordinator =
            RefreshCoordinator::new(deps.client, deps.connectivity, deps.runtime.clone());
        let (trigger_tx, mut trigger_rx) = mpsc::unbounded_channel();
        let scheduler = RefreshScheduler::new(deps.schedule, trigger_tx, deps.runtime.clone());

        coordinator.start(location);
        scheduler.resume_or_arm(options.refresh_interval, options.refresh_interval);

        let pump_coordinator = coordinator.clone();
        let pump = deps.runtime.spawn(async move {
            while let Some(source) = trigger_rx.recv().await {
                pump_coordinator.on_trigger(source);
            }
        });

        Self {
            coordinator,
            scheduler,
            settings: deps.settings,
            pump,
            closed: false,
        }
    }

    pub fn request_manual_refresh(&self) {
        self.coordinator.on_trigger(TriggerSource::Manual);
    }

    /// Persist `location`, then refresh for it. Nothing changes if saving fails.
    pub fn change_location(&self, location: Location) -> Result<(), SessionError> {
        self.settings.set_location(&location)?;
        self.coordinator.on_location_changed(location);
        Ok(())
    }

    pub fn subscribe(&self) -> StateSubscription {
        self.coordinator.subscribe()
    }

    pub fn state(&self) -> RefreshState {
        self.coordinator.state()
    }

    pub fn location(&self) -> Option<Location> {
        self.coordinator.location()
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.coordinator.last_updated()
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.scheduler.disarm();
        self.pump.abort();
        tracing::info!("Weather session closed");
    }
}

impl Drop for WeatherSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WeatherSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherSession")
            .field("coordinator", &self.coordinator)
            .field("scheduler", &self.scheduler)
            .field("closed", &self.closed)
            .finish()
    }
}
