//! Current-weather client for the OpenWeatherMap API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::types::{FetchError, Location, WeatherSnapshot};

/// Performs a single remote fetch of current conditions.
///
/// Implementations must not retry on their own; retries are driven by the
/// next refresh trigger.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    async fn fetch(&self, location: &Location) -> Result<WeatherSnapshot, FetchError>;
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    main: MainBlock,
    weather: Vec<ConditionBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    description: String,
    icon: String,
}

/// Error body, e.g. `{"cod":"404","message":"city not found"}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenWeatherMapClient {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
    units: String,
}

impl OpenWeatherMapClient {
    /// `units` is the provider's unit system: "metric", "imperial" or "standard".
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        units: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            units: units.to_string(),
        })
    }
}

#[async_trait]
impl WeatherClient for OpenWeatherMapClient {
    #[instrument(skip(self, location), fields(location = %location), level = "info")]
    async fn fetch(&self, location: &Location) -> Result<WeatherSnapshot, FetchError> {
        let url = format!("{}/weather", self.base_url);

        let mut request = self
            .client
            .get(&url)
            .query(&[("q", location.as_str()), ("units", self.units.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.query(&[("appid", key.as_str())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                });
            tracing::warn!("Weather provider returned {}: {}", status, message);
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let snapshot = parse_current(&body, location)?;
        tracing::debug!(
            "Fetched weather for {}: {:.1} ({})",
            location,
            snapshot.temperature,
            snapshot.description
        );
        Ok(snapshot)
    }
}

/// Decode a current-weather body into a snapshot stamped with the retrieval time.
fn parse_current(body: &str, location: &Location) -> Result<WeatherSnapshot, FetchError> {
    let parsed: CurrentResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let condition = parsed
        .weather
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Parse("response has no weather conditions".to_string()))?;

    Ok(WeatherSnapshot {
        location: location.clone(),
        temperature: parsed.main.temp,
        temp_min: parsed.main.temp_min,
        temp_max: parsed.main.temp_max,
        description: condition.description,
        icon: condition.icon,
        retrieved_at: Utc::now(),
    })
}
