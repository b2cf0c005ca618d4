use std::sync::Arc;

use adhan_backend::config;
use adhan_backend::module::scheduled::RecreateOutcome;
use adhan_backend::platform::{
    Clock, HttpConnectivity, LocalNotificationCenter, LoggingAudioPlayer, LoggingHaptics,
    StaticGeolocation, SystemClock,
};
use adhan_backend::store::JsonFileStore;
use adhan_backend::{AdhanApp, Collaborators};
use adhan_common::format_hhmm;
use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = config::read_config(&config_path)?;

    let _logging_guard =
        adhan_backend::logging::init_logging(&config.log_dir, "adhan-backend", &config.log_level)?;

    tracing::info!("Adhan backend starting...");
    tracing::info!("Data directory: {}, source: {:?}", config.data_dir, config.api.source);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (notifications, mut fired_rx) = LocalNotificationCenter::new(clock.clone());

    let collaborators = Collaborators {
        clock,
        connectivity: Arc::new(HttpConnectivity::new(config.api.connectivity_probe_url.clone())?),
        geolocation: Arc::new(StaticGeolocation::new(config.location.default_location())),
        notifications: Arc::new(notifications),
        audio: Arc::new(LoggingAudioPlayer::new()),
        haptics: Arc::new(LoggingHaptics),
        store: Arc::new(JsonFileStore::new(&config.data_dir)),
    };
    let app = AdhanApp::build(config, collaborators)?;

    match app.initialize().await {
        RecreateOutcome::Failed(reason) => {
            tracing::warn!("Initial schedule not built: {}", reason)
        }
        outcome => tracing::info!("Initial schedule: {:?}", outcome),
    }

    match app.today(false).await {
        Ok(today) => {
            let day = today.day();
            tracing::info!(
                "Prayer times for {} ({}){}",
                day.date,
                day.hijri_date,
                if today.is_stale() { " [stale]" } else { "" }
            );
            for prayer in &day.prayers {
                tracing::info!("  {:<8} {}", prayer.name.label(), format_hhmm(prayer.time));
            }
        }
        Err(e) => tracing::warn!("Prayer times unavailable: {}", e.user_message()),
    }

    let handles = app.start_background();
    tracing::info!("Running, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down...");
                break;
            }
            Some(fired) = fired_rx.recv() => {
                tracing::info!("Notification {} fired", fired.handle);
                if let Err(e) = app.on_notification_fired(&fired.payload).await {
                    tracing::error!("Failed to handle fired notification: {}", e);
                }
            }
        }
    }

    for handle in handles {
        handle.abort();
    }
    Ok(())
}
