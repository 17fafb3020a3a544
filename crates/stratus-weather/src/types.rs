use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// City selected by the user, as sent to the provider (e.g. "Paris" or "Paris,FR").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct Location(String);

impl Location {
    /// Build a location from user input. Returns `None` for blank names.
    pub fn parse(name: &str) -> Option<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Location {
    type Error = BlankLocation;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        Self::parse(&name).ok_or(BlankLocation)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("location name is blank")]
pub struct BlankLocation;

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Current conditions for one location, as returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub location: Location,
    pub temperature: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub description: String,
    /// Provider icon identifier, e.g. "01d"
    pub icon: String,
    pub retrieved_at: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Image URL for the condition icon: `<icon_base_url><icon>.png`
    pub fn icon_url(&self, icon_base_url: &str) -> String {
        format!("{}{}.png", icon_base_url, self.icon)
    }
}

/// Why a single fetch failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// The request never produced a response (DNS, connect, timeout).
    #[error("Weather request failed: {0}")]
    Transport(String),

    /// The provider answered with a non-success status.
    #[error("Weather provider returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The body could not be decoded into a snapshot.
    #[error("Malformed weather response: {0}")]
    Parse(String),
}
