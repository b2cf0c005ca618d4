//! Composition root: wires the injected capabilities into the services
use std::sync::Arc;
use std::time::Duration;

use adhan_common::{NotificationAction, NotificationPayload, Settings, ValidationError};
use tokio::task::JoinHandle;

use crate::config::{BackendConfig, SourceKind};
use crate::error::AdhanError;
use crate::module::location::LocationResolver;
use crate::module::net::NetworkRetryLayer;
use crate::module::notify::{NotificationLedger, NotificationScheduler};
use crate::module::prayer::{
    AladhanClient, FetchOutcome, NextPrayer, OfflineCalculator, PrayerTimeFetcher, PrayerTimeService,
    PrayerTimeSource,
};
use crate::module::scheduled::{DailyRecreationTask, RecreateOutcome};
use crate::platform::{
    AudioPlayer, Clock, Connectivity, GeolocationProvider, Haptics, NotificationCenter,
};
use crate::settings::{SettingsChange, SettingsStore};
use crate::store::KeyValueStore;

/// Device capabilities supplied by the host
pub struct Collaborators {
    pub clock: Arc<dyn Clock>,
    pub connectivity: Arc<dyn Connectivity>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub notifications: Arc<dyn NotificationCenter>,
    pub audio: Arc<dyn AudioPlayer>,
    pub haptics: Arc<dyn Haptics>,
    pub store: Arc<dyn KeyValueStore>,
}

pub struct AdhanApp {
    settings: Arc<SettingsStore>,
    prayers: Arc<PrayerTimeService>,
    scheduler: Arc<NotificationScheduler>,
    daily: Arc<DailyRecreationTask>,
}

impl AdhanApp {
    /// Build with the prayer-time source named in the config
    pub fn build(config: &BackendConfig, collaborators: Collaborators) -> anyhow::Result<Self> {
        let source: Arc<dyn PrayerTimeSource> = match config.api.source {
            SourceKind::Remote => {
                let retry = Arc::new(NetworkRetryLayer::new(
                    collaborators.connectivity.clone(),
                    config.retry.to_options(),
                ));
                Arc::new(AladhanClient::new(
                    config.api.base_url.clone(),
                    Duration::from_secs(config.api.request_timeout_secs),
                    retry,
                )?)
            }
            SourceKind::Offline => Arc::new(OfflineCalculator::new(collaborators.clock.clone())),
        };
        Ok(Self::with_source(config, collaborators, source))
    }

    pub fn with_source(
        config: &BackendConfig,
        collaborators: Collaborators,
        source: Arc<dyn PrayerTimeSource>,
    ) -> Self {
        let Collaborators {
            clock,
            geolocation,
            notifications,
            audio,
            haptics,
            store,
            ..
        } = collaborators;

        let resolver = Arc::new(LocationResolver::new(
            geolocation,
            clock.clone(),
            Duration::from_secs(config.location.throttle_minutes * 60),
            Some(config.location.default_location()),
        ));
        let fetcher = PrayerTimeFetcher::new(source);
        tracing::info!("Prayer times from '{}' source", fetcher.source_name());

        let settings = Arc::new(SettingsStore::new(store.clone()));
        let prayers = Arc::new(PrayerTimeService::new(resolver, fetcher, clock.clone()));
        let scheduler = Arc::new(NotificationScheduler::new(
            notifications,
            audio,
            haptics,
            clock.clone(),
            NotificationLedger::new(store),
        ));
        let daily = Arc::new(DailyRecreationTask::new(
            config.daily.clone(),
            settings.clone(),
            prayers.clone(),
            scheduler.clone(),
            clock,
        ));

        Self {
            settings,
            prayers,
            scheduler,
            daily,
        }
    }

    pub fn scheduler(&self) -> &Arc<NotificationScheduler> {
        &self.scheduler
    }

    pub fn prayers(&self) -> &Arc<PrayerTimeService> {
        &self.prayers
    }

    pub async fn settings(&self) -> Result<Settings, AdhanError> {
        self.settings.load().await
    }

    /// Ask for permission once, then make sure today is scheduled
    pub async fn initialize(&self) -> RecreateOutcome {
        self.scheduler.initialize().await;
        self.daily.run_if_needed().await
    }

    pub async fn on_foreground(&self) -> RecreateOutcome {
        self.daily.run_if_needed().await
    }

    pub fn start_background(&self) -> Vec<JoinHandle<()>> {
        self.daily.start()
    }

    /// Validate and store an edit, then apply what it invalidates
    pub async fn update_settings<F>(&self, edit: F) -> Result<SettingsChange, AdhanError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ValidationError>,
    {
        let change = self.settings.update(edit).await?;

        if change.requires_cache_reset {
            self.prayers.invalidate().await;
            self.scheduler.cancel_all().await?;
        }
        if change.requires_reschedule {
            let outcome = self.daily.force_recreate().await;
            if let RecreateOutcome::Failed(reason) = outcome {
                tracing::warn!("Settings saved but today's schedule was not rebuilt: {}", reason);
            }
        }
        Ok(change)
    }

    pub async fn on_notification_fired(&self, payload: &NotificationPayload) -> Result<(), AdhanError> {
        let settings = self.settings.load().await?;
        self.scheduler.on_fire(payload, &settings).await
    }

    pub async fn handle_notification_action(
        &self,
        action: NotificationAction,
        payload: &NotificationPayload,
    ) -> Result<bool, AdhanError> {
        let settings = self.settings.load().await?;
        self.scheduler.handle_action(action, payload, &settings).await
    }

    /// Today's adjusted table, possibly stale when offline
    pub async fn today(&self, force: bool) -> Result<FetchOutcome, AdhanError> {
        let settings = self.settings.load().await?;
        let outcome = self.prayers.today_adjusted(&settings, force).await;
        self.follow_location_change().await;
        outcome
    }

    pub async fn next_prayer(&self) -> Result<NextPrayer, AdhanError> {
        let settings = self.settings.load().await?;
        let next = self.prayers.next_prayer(&settings).await;
        self.follow_location_change().await;
        next
    }

    /// A lookup noticed the device moved: today's notifications are for the old place
    async fn follow_location_change(&self) {
        if !self.prayers.take_location_change() {
            return;
        }
        match self.daily.force_recreate().await {
            RecreateOutcome::Failed(reason) => {
                tracing::warn!("Location changed but today's schedule was not rebuilt: {}", reason);
                self.prayers.flag_location_change();
            }
            outcome => tracing::info!("Location changed, schedule rebuilt: {:?}", outcome),
        }
    }
}
