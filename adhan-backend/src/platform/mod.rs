//! Device capabilities the service depends on.
//!
//! Everything here is injected at construction by the composition root
//! (`AdhanApp`), so the scheduling logic never touches a global or the real
//! wall clock directly.

use std::time::Duration;

use adhan_common::{Location, NotificationRequest};
use async_trait::async_trait;
use chrono::{Local, NaiveDate, NaiveDateTime};

mod host;
pub use host::{
    FiredNotification, HttpConnectivity, LocalNotificationCenter, LoggingAudioPlayer,
    LoggingHaptics, StaticGeolocation,
};

/// Source of device-local wall time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today(&self) -> NaiveDate {
        self.now().date()
    }

    /// Offset of local time from UTC in minutes
    fn utc_offset_minutes(&self) -> i32;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn utc_offset_minutes(&self) -> i32 {
        Local::now().offset().local_minus_utc() / 60
    }
}

#[async_trait]
pub trait Connectivity: Send + Sync {
    async fn is_online(&self) -> bool;
}

#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_location(&self) -> anyhow::Result<Location>;
}

/// OS-level local notification facility
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    /// Ask for (or report) permission to post notifications
    async fn request_permission(&self) -> bool;

    /// Returns an opaque handle used to cancel the notification later
    async fn schedule(&self, request: &NotificationRequest) -> anyhow::Result<String>;

    async fn cancel(&self, handle: &str) -> anyhow::Result<()>;
}

/// Playback contract for the adhan audio. Decoding is the implementor's business.
#[async_trait]
pub trait AudioPlayer: Send + Sync {
    async fn play(&self, track: &str, volume: f32, fade_in: Duration) -> anyhow::Result<()>;
    async fn pause(&self) -> anyhow::Result<()>;
    async fn stop(&self) -> anyhow::Result<()>;
    async fn set_volume(&self, volume: f32) -> anyhow::Result<()>;
    async fn seek(&self, position: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HapticPattern {
    PrayerAlert,
    Confirm,
}

pub trait Haptics: Send + Sync {
    fn vibrate(&self, pattern: HapticPattern);
}
