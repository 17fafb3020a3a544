//! Weather data access for Stratus
//!
//! The leaf collaborators of the refresh pipeline: the current-weather client
//! (OpenWeatherMap), the network reachability probe, the chosen-city store and
//! display formatting helpers.

pub mod connectivity;
pub mod display;
pub mod provider;
pub mod settings;
pub mod types;

pub use connectivity::{ConnectivityChecker, NetworkMonitor};
pub use provider::{OpenWeatherMapClient, WeatherClient};
pub use settings::{FileSettingsStore, MemorySettingsStore, SettingsError, SettingsStore};
pub use types::*;
