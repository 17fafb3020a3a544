//! Terminal view: renders refresh states and parses typed commands.

use chrono::{DateTime, Local, Utc};
use thiserror::Error;

use stratus_refresh::RefreshState;
use stratus_weather::display::{format_last_update, format_min_max, format_temperature};
use stratus_weather::Location;

use crate::error_mapping::failure_to_app_error;

pub const HELP: &str = "Commands: refresh (r), city <name>, help (?), quit (q)";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Refresh,
    ChangeCity(Location),
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("Usage: city <name>")]
    MissingCity,

    #[error("Unknown command '{0}'. Type 'help' for the list.")]
    Unknown(String),
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "" => return Ok(None),
            "refresh" | "r" => Self::Refresh,
            "city" => Self::ChangeCity(Location::parse(rest).ok_or(CommandError::MissingCity)?),
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(Some(command))
    }
}

/// Text for one state transition, `None` when there is nothing to show.
pub fn render_state(
    state: &RefreshState,
    location: Option<&Location>,
    last_updated: Option<DateTime<Utc>>,
    icon_base_url: &str,
) -> Option<String> {
    match state {
        RefreshState::Idle => None,
        RefreshState::Loading => Some(match location {
            Some(location) => format!("Updating weather for {}...", location),
            None => "Updating weather...".to_string(),
        }),
        RefreshState::Loaded(snapshot) => {
            let mut lines = vec![
                format!(
                    "{}: {} {}",
                    snapshot.location,
                    format_temperature(snapshot.temperature),
                    snapshot.description
                ),
                format!("  {}", format_min_max(snapshot)),
                format!("  {}", snapshot.icon_url(icon_base_url)),
            ];
            if let Some(at) = last_updated {
                lines.push(format!("  {}", format_last_update(&at.with_timezone(&Local))));
            }
            Some(lines.join("\n"))
        }
        RefreshState::Failed(reason) => {
            Some(format!("! {}", failure_to_app_error(reason).user_message()))
        }
    }
}
