use stratus_weather::{FetchError, WeatherSnapshot};

/// What the view shows. Only the coordinator produces these.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshState {
    /// Before the session started
    Idle,
    Loading,
    Loaded(WeatherSnapshot),
    Failed(FailureReason),
}

/// Why the last refresh did not produce data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureReason {
    #[error("no network connection")]
    NoNetwork,

    /// Remote call failed or returned a non-success status (`status` is `None`
    /// when no response arrived at all).
    #[error("weather provider error: {message}")]
    ProviderError { status: Option<u16>, message: String },

    #[error("unreadable weather response: {0}")]
    ParseError(String),
}

impl FailureReason {
    /// Stable short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoNetwork => "no-network",
            Self::ProviderError { .. } => "provider-error",
            Self::ParseError(_) => "parse-error",
        }
    }
}

impl From<FetchError> for FailureReason {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::Transport(message) => Self::ProviderError {
                status: None,
                message,
            },
            FetchError::Status { status, message } => Self::ProviderError {
                status: Some(status),
                message,
            },
            FetchError::Parse(message) => Self::ParseError(message),
        }
    }
}
