//! Per-prayer minute offsets applied on read
use adhan_common::{
    Adjustments, DayPrayerTimes, MINUTES_PER_DAY, PrayerTime, Settings, minutes_of_day,
    time_from_minutes,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

pub struct AdjustmentEngine;

impl AdjustmentEngine {
    /// Copy of `day` with each prayer shifted by its offset, wrapped into the day.
    /// The input is left as is.
    pub fn apply(day: &DayPrayerTimes, adjustments: &Adjustments) -> DayPrayerTimes {
        let mut adjusted = day.clone();
        for prayer in adjusted.prayers.iter_mut() {
            Self::shift(prayer, adjustments.minutes_for(prayer.name));
        }
        adjusted
    }

    /// Same as `apply`, also carrying the per-prayer notification toggles
    pub fn apply_settings(day: &DayPrayerTimes, settings: &Settings) -> DayPrayerTimes {
        let mut adjusted = Self::apply(day, &settings.adjustments());
        for prayer in adjusted.prayers.iter_mut() {
            prayer.notification_enabled =
                settings.notifications_enabled && settings.prayer(prayer.name).enabled;
        }
        adjusted
    }

    fn shift(prayer: &mut PrayerTime, minutes: i32) {
        prayer.adjustment = minutes;
        prayer.time = time_from_minutes(minutes_of_day(prayer.original_time) + minutes);
    }

    /// Absolute fire time, rolling onto the previous or next date when the
    /// offset crosses midnight
    pub fn adjusted_fire_time(date: NaiveDate, original: NaiveTime, adjustment: i32) -> NaiveDateTime {
        let total = minutes_of_day(original) + adjustment;
        let day_shift = total.div_euclid(MINUTES_PER_DAY);
        let time = time_from_minutes(total);
        (date + Duration::days(day_shift as i64)).and_time(time)
    }
}
