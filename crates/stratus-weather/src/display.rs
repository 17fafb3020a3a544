//! Display formatting. Values are shown in whatever unit the provider returned.

use chrono::{DateTime, TimeZone};

use crate::types::WeatherSnapshot;

pub fn format_temperature(value: f64) -> String {
    format!("{:.1}°", value)
}

/// High first, as in "21.0° - 15.0°"
pub fn format_min_max(snapshot: &WeatherSnapshot) -> String {
    format!(
        "{} - {}",
        format_temperature(snapshot.temp_max),
        format_temperature(snapshot.temp_min)
    )
}

pub fn format_last_update<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    format!("Last update: {}", at.format("%H:%M"))
}
