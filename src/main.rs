mod console;
mod error_mapping;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use stratus_core::Config;
use stratus_refresh::{
    FileScheduleStore, RefreshState, SessionDeps, SessionOptions, WeatherSession,
};
use stratus_weather::{FileSettingsStore, Location, NetworkMonitor, OpenWeatherMapClient};

use crate::console::{render_state, Command, HELP};
use crate::error_mapping::{session_error_to_app_error, startup_error_to_app_error};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize core
    stratus_core::init()?;

    let (config, _warnings) = match Config::load_validated() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("! {}", startup_error_to_app_error(&e).user_message());
            return Err(e);
        }
    };
    tracing::info!("Config directory: {}", config.config_dir.display());

    let probe_address: SocketAddr = config
        .connectivity
        .probe_address
        .parse()
        .context("Invalid connectivity.probe_address")?;
    let monitor = NetworkMonitor::new(probe_address, config.connectivity.probe_timeout());
    monitor.probe_now().await;
    let probe_cancel = CancellationToken::new();
    let probe_task = monitor.spawn(config.connectivity.probe_interval(), probe_cancel.clone());

    let client = OpenWeatherMapClient::new(
        &config.weather.api_base_url,
        config.weather.resolve_api_key(),
        config.weather.temperature_unit.api_units(),
        config.weather.request_timeout(),
    )
    .context("Failed to build weather client")?;

    let default_location = Location::parse(&config.weather.default_city)
        .context("weather.default_city must not be blank")?;

    let session = WeatherSession::open(
        SessionDeps {
            client: Arc::new(client),
            connectivity: Arc::new(monitor),
            settings: Arc::new(FileSettingsStore::new(config.settings_path())),
            schedule: Arc::new(FileScheduleStore::new(config.schedule_path())),
            runtime: Handle::current(),
        },
        SessionOptions {
            default_location,
            refresh_interval: config.weather.refresh_interval(),
        },
    );

    println!("Stratus - current weather");
    println!("{}", HELP);

    let icon_base_url = config.weather.icon_base_url.as_str();
    let show = |state: &RefreshState| {
        let location = session.location();
        if let Some(text) =
            render_state(state, location.as_ref(), session.last_updated(), icon_base_url)
        {
            println!("{}", text);
        }
    };

    let mut updates = session.subscribe();
    show(&session.state());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(state) = updates.next() => show(&state),
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read from stdin")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Refresh)) => session.request_manual_refresh(),
                    Ok(Some(Command::ChangeCity(location))) => {
                        if let Err(e) = session.change_location(location) {
                            tracing::error!("Failed to change city: {}", e);
                            println!("! {}", session_error_to_app_error(e).user_message());
                        }
                    }
                    Ok(Some(Command::Help)) => println!("{}", HELP),
                    Ok(Some(Command::Quit)) => break,
                    Err(e) => println!("{}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // Graceful shutdown
    session.close();
    probe_cancel.cancel();
    if let Err(e) = probe_task.await {
        tracing::warn!("Connectivity probe task ended abnormally: {}", e);
    }

    tracing::info!("Stratus stopped");
    Ok(())
}
