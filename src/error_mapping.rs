//! Maps refresh failures and session errors to `stratus_core::AppError` so the
//! console shows the same user-facing wording everywhere.

use stratus_core::{AppError, ConfigError, NetworkError, StorageError, WeatherError};
use stratus_refresh::{FailureReason, SessionError};
use stratus_weather::SettingsError;

pub fn failure_to_app_error(reason: &FailureReason) -> AppError {
    match reason {
        FailureReason::NoNetwork => AppError::Network(NetworkError::Offline),
        FailureReason::ProviderError {
            status: None,
            message,
        } => AppError::Network(NetworkError::ConnectionFailed(message.clone())),
        FailureReason::ProviderError {
            status: Some(status),
            message,
        } => match *status {
            401 => AppError::Weather(WeatherError::InvalidApiKey),
            404 => AppError::Weather(WeatherError::LocationNotFound(message.clone())),
            s if s >= 500 => AppError::Weather(WeatherError::ServiceUnavailable),
            _ => AppError::Weather(WeatherError::ApiError(message.clone())),
        },
        FailureReason::ParseError(detail) => {
            AppError::Weather(WeatherError::MalformedResponse(detail.clone()))
        }
    }
}

pub fn session_error_to_app_error(e: SessionError) -> AppError {
    match e {
        SessionError::Settings(SettingsError::Read { path, .. }) => {
            AppError::Storage(StorageError::ReadFailed(path.display().to_string()))
        }
        SessionError::Settings(SettingsError::Write { path, .. }) => {
            AppError::Storage(StorageError::WriteFailed(path.display().to_string()))
        }
        SessionError::Settings(SettingsError::Corrupted(detail)) => {
            AppError::Storage(StorageError::Corrupted(detail))
        }
    }
}

/// Startup failures arrive as `anyhow` chains; classify by the root error.
pub fn startup_error_to_app_error(e: &anyhow::Error) -> AppError {
    if let Some(config_err) = e.downcast_ref::<ConfigError>() {
        return AppError::Config(match config_err {
            ConfigError::Invalid(detail) => ConfigError::Invalid(detail.clone()),
            ConfigError::ParseError(detail) => ConfigError::ParseError(detail.clone()),
        });
    }
    if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
        return AppError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
    }
    AppError::Other(anyhow::anyhow!("{:#}", e))
}
