use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{CalculationMethod, Location, PrayerName};

/// Largest accepted per-prayer adjustment, in minutes either way
pub const MAX_ADJUSTMENT_MINUTES: i32 = 30;

/// Upper bound for the snooze ceiling a user can configure
pub const MAX_SNOOZE_CEILING: u32 = 10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("adjustment for {prayer} must be within ±{max} minutes, got {minutes}")]
    AdjustmentOutOfRange {
        prayer: PrayerName,
        minutes: i32,
        max: i32,
    },

    #[error("volume must be within 0.0..=1.0, got {0}")]
    VolumeOutOfRange(f32),

    #[error("invalid snooze policy: {0}")]
    SnoozePolicy(String),

    #[error("manual location mode requires a location")]
    MissingManualLocation,
}

/// Check an adjustment at the settings boundary. Out-of-range values are rejected, never clamped.
pub fn validate_adjustment(prayer: PrayerName, minutes: i32) -> Result<i32, ValidationError> {
    if (-MAX_ADJUSTMENT_MINUTES..=MAX_ADJUSTMENT_MINUTES).contains(&minutes) {
        Ok(minutes)
    } else {
        Err(ValidationError::AdjustmentOutOfRange {
            prayer,
            minutes,
            max: MAX_ADJUSTMENT_MINUTES,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LocationMode {
    #[default]
    Auto,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerSetting {
    pub enabled: bool,
    pub adjustment: i32,
}

impl Default for PrayerSetting {
    fn default() -> Self {
        Self {
            enabled: true,
            adjustment: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozePolicy {
    pub enabled: bool,
    pub max_snoozes: u32,
    pub duration_minutes: u32,
}

impl Default for SnoozePolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_snoozes: 3,
            duration_minutes: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub enable_adhan: bool,
    pub selected_audio: String,
    /// 0.0 ..= 1.0
    pub volume: f32,
    /// Seconds
    pub fade_in_duration: u32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enable_adhan: true,
            selected_audio: "makkah".to_string(),
            volume: 0.8,
            fade_in_duration: 5,
        }
    }
}

/// Per-prayer minute offsets, already validated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Adjustments(BTreeMap<PrayerName, i32>);

impl Adjustments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, prayer: PrayerName, minutes: i32) -> Result<(), ValidationError> {
        let minutes = validate_adjustment(prayer, minutes)?;
        self.0.insert(prayer, minutes);
        Ok(())
    }

    pub fn minutes_for(&self, prayer: PrayerName) -> i32 {
        self.0.get(&prayer).copied().unwrap_or(0)
    }
}

/// The persisted user settings blob
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub calculation_method: CalculationMethod,
    pub location_mode: LocationMode,
    pub manual_location: Option<Location>,
    /// Master switch for prayer notifications
    pub notifications_enabled: bool,
    pub prayers: BTreeMap<PrayerName, PrayerSetting>,
    pub snooze: SnoozePolicy,
    pub audio: AudioSettings,
    pub vibration_enabled: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            calculation_method: CalculationMethod::default(),
            location_mode: LocationMode::Auto,
            manual_location: None,
            notifications_enabled: true,
            prayers: PrayerName::ALL
                .iter()
                .map(|name| (*name, PrayerSetting::default()))
                .collect(),
            snooze: SnoozePolicy::default(),
            audio: AudioSettings::default(),
            vibration_enabled: true,
        }
    }
}

impl Settings {
    pub fn prayer(&self, name: PrayerName) -> PrayerSetting {
        self.prayers.get(&name).copied().unwrap_or_default()
    }

    /// Set one adjustment; on error the settings are left untouched
    pub fn set_adjustment(&mut self, name: PrayerName, minutes: i32) -> Result<(), ValidationError> {
        let minutes = validate_adjustment(name, minutes)?;
        self.prayers.entry(name).or_default().adjustment = minutes;
        Ok(())
    }

    pub fn set_enabled(&mut self, name: PrayerName, enabled: bool) {
        self.prayers.entry(name).or_default().enabled = enabled;
    }

    pub fn adjustments(&self) -> Adjustments {
        let mut adjustments = Adjustments::new();
        for name in PrayerName::ALL {
            // Stored blobs are validated on load, anything else falls back to zero
            if adjustments.set(name, self.prayer(name).adjustment).is_err() {
                adjustments.0.insert(name, 0);
            }
        }
        adjustments
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, setting) in &self.prayers {
            validate_adjustment(*name, setting.adjustment)?;
        }

        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(ValidationError::VolumeOutOfRange(self.audio.volume));
        }

        if self.snooze.max_snoozes > MAX_SNOOZE_CEILING {
            return Err(ValidationError::SnoozePolicy(format!(
                "at most {} snoozes allowed, got {}",
                MAX_SNOOZE_CEILING, self.snooze.max_snoozes
            )));
        }
        if self.snooze.enabled && self.snooze.duration_minutes == 0 {
            return Err(ValidationError::SnoozePolicy(
                "snooze duration must be at least one minute".to_string(),
            ));
        }

        if self.location_mode == LocationMode::Manual && self.manual_location.is_none() {
            return Err(ValidationError::MissingManualLocation);
        }

        Ok(())
    }
}
