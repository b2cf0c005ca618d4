//! Shared data model for the adhan service: prayers, day tables, user
//! settings and the payloads attached to scheduled notifications.

pub mod payload;
pub mod settings;
pub mod types;

pub use payload::{
    NotificationAction, NotificationPayload, NotificationRequest, PrayerTimePayload, SnoozePayload,
};
pub use settings::{
    Adjustments, AudioSettings, LocationMode, PrayerSetting, Settings, SnoozePolicy,
    ValidationError, validate_adjustment, MAX_ADJUSTMENT_MINUTES,
};
pub use types::{
    CalculationMethod, DayPrayerTimes, Location, MonthKey, PrayerName, PrayerTime, date_key,
    format_hhmm, minutes_of_day, parse_date_key, parse_hhmm, time_from_minutes,
    LOCATION_EPSILON_DEG, MINUTES_PER_DAY,
};
