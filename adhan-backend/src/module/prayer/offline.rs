//! Deterministic prayer-time generator for use without a network.
//!
//! Computes solar position from the date (declination and equation of
//! time), then derives each prayer from the sun's hour angle at a fixed
//! altitude. Where the sun never reaches an altitude (high latitudes in
//! summer) the night is split in sevenths instead.

use std::sync::Arc;

use adhan_common::{
    CalculationMethod, DayPrayerTimes, Location, MonthKey, PrayerName, PrayerTime,
    time_from_minutes,
};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use super::fetcher::PrayerTimeSource;
use crate::error::AdhanError;
use crate::platform::Clock;

/// Julian day number of 0001-01-01 minus one
const JDN_CE_OFFSET: i64 = 1_721_425;
const J2000: f64 = 2_451_545.0;
const SUNSET_ALTITUDE: f64 = -0.833;

const HIJRI_MONTHS: [&str; 12] = [
    "Muharram",
    "Safar",
    "Rabi al-Awwal",
    "Rabi al-Thani",
    "Jumada al-Ula",
    "Jumada al-Akhirah",
    "Rajab",
    "Shaban",
    "Ramadan",
    "Shawwal",
    "Dhu al-Qadah",
    "Dhu al-Hijjah",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum IshaRule {
    /// Sun depression angle in degrees
    Angle(f64),
    /// Fixed minutes after maghrib
    AfterMaghrib(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MethodParams {
    fajr_angle: f64,
    isha: IshaRule,
}

fn method_params(method: CalculationMethod) -> MethodParams {
    match method.id() {
        1 => MethodParams { fajr_angle: 18.0, isha: IshaRule::Angle(18.0) },
        2 => MethodParams { fajr_angle: 15.0, isha: IshaRule::Angle(15.0) },
        4 => MethodParams { fajr_angle: 18.5, isha: IshaRule::AfterMaghrib(90.0) },
        5 => MethodParams { fajr_angle: 19.5, isha: IshaRule::Angle(17.5) },
        _ => MethodParams { fajr_angle: 18.0, isha: IshaRule::Angle(17.0) },
    }
}

fn julian_day_number(date: NaiveDate) -> i64 {
    date.num_days_from_ce() as i64 + JDN_CE_OFFSET
}

/// Declination (radians) and equation of time (hours) at local noon
fn sun_position(date: NaiveDate, longitude: f64) -> (f64, f64) {
    let d = julian_day_number(date) as f64 - J2000 - longitude / 360.0;
    let g = (357.529 + 0.985_600_28 * d).rem_euclid(360.0).to_radians();
    let q = (280.459 + 0.985_647_36 * d).rem_euclid(360.0);
    let l = (q + 1.915 * g.sin() + 0.020 * (2.0 * g).sin())
        .rem_euclid(360.0)
        .to_radians();
    let e = (23.439 - 0.000_000_36 * d).to_radians();

    let right_ascension = ((e.cos() * l.sin()).atan2(l.cos()).to_degrees() / 15.0).rem_euclid(24.0);
    let declination = (e.sin() * l.sin()).asin();
    let equation_of_time = (q / 15.0 - right_ascension + 12.0).rem_euclid(24.0) - 12.0;
    (declination, equation_of_time)
}

/// Hours between noon and the moment the sun is at `altitude` degrees
fn hour_angle(altitude: f64, latitude: f64, declination: f64) -> Option<f64> {
    let lat = latitude.to_radians();
    let x = (altitude.to_radians().sin() - declination.sin() * lat.sin())
        / (declination.cos() * lat.cos());
    if (-1.0..=1.0).contains(&x) {
        Some(x.acos().to_degrees() / 15.0)
    } else {
        None
    }
}

/// Local-clock hours for fajr, dhuhr, asr, maghrib, isha
fn compute_hours(date: NaiveDate, location: &Location, utc_offset_minutes: i32, params: MethodParams) -> [f64; 5] {
    let (declination, equation_of_time) = sun_position(date, location.longitude);
    let timezone = utc_offset_minutes as f64 / 60.0;
    let noon = 12.0 + timezone - location.longitude / 15.0 - equation_of_time;

    let Some(half_day) = hour_angle(SUNSET_ALTITUDE, location.latitude, declination) else {
        // Polar day or night: fixed offsets around solar noon
        return [noon - 7.0, noon, noon + 3.0, noon + 6.0, noon + 7.5];
    };

    let sunrise = noon - half_day;
    let sunset = noon + half_day;
    let night = 24.0 - 2.0 * half_day;

    let fajr = hour_angle(-params.fajr_angle, location.latitude, declination)
        .map(|t| noon - t)
        .unwrap_or(sunrise - night / 7.0);

    // Shadow ratio 1
    let asr_altitude = (1.0 / (1.0 + (location.latitude.to_radians() - declination).abs().tan()))
        .atan()
        .to_degrees();
    let asr = hour_angle(asr_altitude, location.latitude, declination)
        .map(|t| noon + t)
        .unwrap_or(noon + half_day / 2.0);

    let isha = match params.isha {
        IshaRule::Angle(angle) => hour_angle(-angle, location.latitude, declination)
            .map(|t| noon + t)
            .unwrap_or(sunset + night / 7.0),
        IshaRule::AfterMaghrib(minutes) => sunset + minutes / 60.0,
    };

    [fajr, noon, asr, sunset, isha]
}

/// Tabular Islamic calendar date as "day month year"
pub fn hijri_date(date: NaiveDate) -> String {
    let mut l = julian_day_number(date) - 1_948_440 + 10_632;
    let n = (l - 1) / 10_631;
    l = l - 10_631 * n + 354;
    let j = ((10_985 - l) / 5_316) * ((50 * l) / 17_719) + (l / 5_670) * ((43 * l) / 15_238);
    l = l - ((30 - j) / 15) * ((17_719 * j) / 50) - (j / 16) * ((15_238 * j) / 43) + 29;
    let month = (24 * l) / 709;
    let day = l - (709 * month) / 24;
    let year = 30 * n + j - 30;

    let month_name = HIJRI_MONTHS
        .get((month - 1).clamp(0, 11) as usize)
        .copied()
        .unwrap_or("Muharram");
    format!("{} {} {}", day, month_name, year)
}

/// Compute one day's raw table
pub fn compute_day(
    date: NaiveDate,
    location: &Location,
    method: CalculationMethod,
    utc_offset_minutes: i32,
) -> DayPrayerTimes {
    let hours = compute_hours(date, location, utc_offset_minutes, method_params(method));
    let prayers = PrayerName::ALL
        .iter()
        .zip(hours)
        .map(|(name, hour)| PrayerTime::new(*name, time_from_minutes((hour * 60.0).round() as i32)))
        .collect();

    DayPrayerTimes {
        date,
        hijri_date: hijri_date(date),
        prayers,
        location: location.clone(),
        method,
    }
}

pub struct OfflineCalculator {
    clock: Arc<dyn Clock>,
}

impl OfflineCalculator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl PrayerTimeSource for OfflineCalculator {
    fn name(&self) -> &'static str {
        "offline"
    }

    async fn fetch_month(
        &self,
        location: &Location,
        method: CalculationMethod,
        month: MonthKey,
    ) -> Result<Vec<DayPrayerTimes>, AdhanError> {
        let offset = location
            .utc_offset_minutes
            .unwrap_or_else(|| self.clock.utc_offset_minutes());

        Ok(month
            .dates()
            .into_iter()
            .map(|date| compute_day(date, location, method, offset))
            .collect())
    }
}
