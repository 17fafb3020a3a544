//! Centralized error types for Stratus.
//!
//! Every failure a user can see is convertible to [`AppError`], which knows how
//! to phrase itself for display via `user_message()`. The full error (with
//! provider detail) stays available through `Display` for logging.

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a UI-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Network(e) => e.user_message(),
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Storage(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Network-related errors (connectivity, HTTP transport).
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("No network connection")]
    Offline,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
}

impl NetworkError {
    pub fn user_message(&self) -> &'static str {
        match self {
            NetworkError::Offline => {
                "No network connection. Weather will update when you're back online."
            }
            NetworkError::ConnectionFailed(_) => {
                "Unable to connect. Check your internet connection."
            }
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
        }
    }
}

/// Weather provider errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Location not found: {0}")]
    LocationNotFound(String),

    #[error("Weather API error: {0}")]
    ApiError(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Service unavailable")]
    ServiceUnavailable,

    #[error("Malformed weather response: {0}")]
    MalformedResponse(String),
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::LocationNotFound(_) => "City not found. Check the name and try again.",
            WeatherError::ApiError(_) => "Weather service error. Please try again.",
            WeatherError::InvalidApiKey => "Weather API key is invalid. Check settings.",
            WeatherError::ServiceUnavailable => {
                "Weather service unavailable. Please try again later."
            }
            WeatherError::MalformedResponse(_) => {
                "Received unreadable weather data. Please try again later."
            }
        }
    }
}

/// Local persistence errors (chosen city, refresh schedule).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to read {0}")]
    ReadFailed(String),

    #[error("Failed to write {0}")]
    WriteFailed(String),

    #[error("Stored data is corrupted: {0}")]
    Corrupted(String),
}

impl StorageError {
    pub fn user_message(&self) -> &'static str {
        match self {
            StorageError::ReadFailed(_) => "Unable to read saved settings. Using defaults.",
            StorageError::WriteFailed(_) => "Failed to save your settings. Please try again.",
            StorageError::Corrupted(_) => "Saved settings are corrupted. Please choose a city again.",
        }
    }
}
