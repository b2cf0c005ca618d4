//! Persisted user settings and the invalidations a change implies
use std::sync::Arc;

use adhan_common::{Settings, ValidationError};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AdhanError;
use crate::store::{KeyValueStore, keys, load_json, save_json};

/// What a settings update invalidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingsChange {
    /// Location or method changed: cached months are for the wrong inputs
    pub requires_cache_reset: bool,
    /// Scheduled notifications no longer match the settings
    pub requires_reschedule: bool,
}

impl SettingsChange {
    pub fn between(old: &Settings, new: &Settings) -> Self {
        let requires_cache_reset = old.calculation_method != new.calculation_method
            || old.location_mode != new.location_mode
            || old.manual_location != new.manual_location;

        let requires_reschedule = requires_cache_reset
            || old.notifications_enabled != new.notifications_enabled
            || old.prayers != new.prayers
            || old.snooze != new.snooze
            || old.audio != new.audio;

        Self {
            requires_cache_reset,
            requires_reschedule,
        }
    }

    pub fn is_noop(&self) -> bool {
        !self.requires_cache_reset && !self.requires_reschedule
    }
}

pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Settings>>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            current: RwLock::new(None),
        }
    }

    /// Current settings; defaults when nothing valid has been stored
    pub async fn load(&self) -> Result<Settings, AdhanError> {
        if let Some(settings) = self.current.read().await.clone() {
            return Ok(settings);
        }

        let stored = match load_json::<Settings>(self.store.as_ref(), keys::SETTINGS).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Stored settings are unreadable, using defaults: {:#}", e);
                None
            }
        };
        let settings = match stored {
            Some(settings) => match settings.validate() {
                Ok(()) => settings,
                Err(e) => {
                    warn!("Stored settings are invalid ({}), using defaults", e);
                    Settings::default()
                }
            },
            None => Settings::default(),
        };

        *self.current.write().await = Some(settings.clone());
        Ok(settings)
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), AdhanError> {
        settings.validate()?;
        save_json(self.store.as_ref(), keys::SETTINGS, settings).await?;
        *self.current.write().await = Some(settings.clone());
        Ok(())
    }

    /// Apply an edit. Nothing is stored when the edit or the result is invalid.
    pub async fn update<F>(&self, edit: F) -> Result<SettingsChange, AdhanError>
    where
        F: FnOnce(&mut Settings) -> Result<(), ValidationError>,
    {
        let old = self.load().await?;
        let mut new = old.clone();
        edit(&mut new)?;
        new.validate()?;

        let change = SettingsChange::between(&old, &new);
        if new != old {
            self.save(&new).await?;
            info!(
                "Settings updated (cache reset: {}, reschedule: {})",
                change.requires_cache_reset, change.requires_reschedule
            );
        }
        Ok(change)
    }
}
