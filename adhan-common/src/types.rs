use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// Minutes in one civil day
pub const MINUTES_PER_DAY: i32 = 24 * 60;

/// Coordinate delta (degrees) below which two locations are the same place
pub const LOCATION_EPSILON_DEG: f64 = 0.001;

/// The five daily prayers, in chronological order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerName {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 5] = [
        PrayerName::Fajr,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PrayerName::Fajr => "fajr",
            PrayerName::Dhuhr => "dhuhr",
            PrayerName::Asr => "asr",
            PrayerName::Maghrib => "maghrib",
            PrayerName::Isha => "isha",
        }
    }

    /// Human readable label used in notification titles
    pub fn label(&self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }
}

impl std::fmt::Display for PrayerName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PrayerName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fajr" => Ok(PrayerName::Fajr),
            "dhuhr" | "zuhr" => Ok(PrayerName::Dhuhr),
            "asr" => Ok(PrayerName::Asr),
            "maghrib" => Ok(PrayerName::Maghrib),
            "isha" => Ok(PrayerName::Isha),
            _ => Err(format!("Unknown prayer: {}", s)),
        }
    }
}

/// Minutes since local midnight
pub fn minutes_of_day(time: NaiveTime) -> i32 {
    (time.hour() * 60 + time.minute()) as i32
}

/// Build a wall-clock time from minutes since midnight, wrapping into [0, 1440)
pub fn time_from_minutes(minutes: i32) -> NaiveTime {
    let wrapped = minutes.rem_euclid(MINUTES_PER_DAY) as u32;
    NaiveTime::from_hms_opt(wrapped / 60, wrapped % 60, 0).unwrap_or(NaiveTime::MIN)
}

/// Format as "HH:MM"
pub fn format_hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

/// Parse "HH:MM" (seconds are not accepted)
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

/// Serde adapter storing a `NaiveTime` as "HH:MM"
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hhmm(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_hhmm(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid HH:MM time: {}", raw)))
    }
}

/// A geographic position with an optional place name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    /// Local offset from UTC, when the provider knows it
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            city: None,
            country: None,
            utc_offset_minutes: None,
        }
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = Some(minutes);
        self
    }

    /// Both coordinates within `LOCATION_EPSILON_DEG`
    pub fn coordinates_match(&self, other: &Location) -> bool {
        (self.latitude - other.latitude).abs() <= LOCATION_EPSILON_DEG
            && (self.longitude - other.longitude).abs() <= LOCATION_EPSILON_DEG
    }

    /// A meaningful move: coordinates drifted past the epsilon or the city changed
    pub fn has_moved_from(&self, previous: &Location) -> bool {
        !self.coordinates_match(previous) || self.city != previous.city
    }

    pub fn describe(&self) -> String {
        match &self.city {
            Some(city) => format!("{} ({:.4}, {:.4})", city, self.latitude, self.longitude),
            None => format!("({:.4}, {:.4})", self.latitude, self.longitude),
        }
    }
}

/// Astronomical calculation method, passed through to the time source as an id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculationMethod(pub u8);

impl CalculationMethod {
    pub const KARACHI: CalculationMethod = CalculationMethod(1);
    pub const ISNA: CalculationMethod = CalculationMethod(2);
    pub const MUSLIM_WORLD_LEAGUE: CalculationMethod = CalculationMethod(3);
    pub const UMM_AL_QURA: CalculationMethod = CalculationMethod(4);
    pub const EGYPTIAN: CalculationMethod = CalculationMethod(5);

    pub fn id(&self) -> u8 {
        self.0
    }
}

impl Default for CalculationMethod {
    fn default() -> Self {
        CalculationMethod::MUSLIM_WORLD_LEAGUE
    }
}

impl std::fmt::Display for CalculationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "method-{}", self.0)
    }
}

/// One prayer on one day
///
/// `original_time` is what the time source produced; `time` is what gets shown
/// once an adjustment is applied. Cached copies always have `time == original_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrayerTime {
    pub name: PrayerName,
    #[serde(with = "hhmm")]
    pub original_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    /// Signed minutes, kept within [-30, 30] by settings validation
    pub adjustment: i32,
    pub notification_enabled: bool,
}

impl PrayerTime {
    pub fn new(name: PrayerName, original_time: NaiveTime) -> Self {
        Self {
            name,
            original_time,
            time: original_time,
            adjustment: 0,
            notification_enabled: true,
        }
    }

    /// Drop any display adjustment
    pub fn reset(&mut self) {
        self.adjustment = 0;
        self.time = self.original_time;
    }
}

/// All five prayers for one date, tagged with the inputs they were computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayPrayerTimes {
    pub date: NaiveDate,
    pub hijri_date: String,
    pub prayers: Vec<PrayerTime>,
    pub location: Location,
    pub method: CalculationMethod,
}

impl DayPrayerTimes {
    pub fn get(&self, name: PrayerName) -> Option<&PrayerTime> {
        self.prayers.iter().find(|p| p.name == name)
    }

    pub fn date_key(&self) -> String {
        date_key(self.date)
    }
}

/// Ledger/payload key for a date ("YYYY-MM-DD")
pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Calendar month identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        match (
            self.first_day(),
            NaiveDate::from_ymd_opt(next_year, next_month, 1),
        ) {
            (Some(first), Some(next)) => (next - first).num_days() as u32,
            _ => 0,
        }
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        (1..=self.days_in_month())
            .filter_map(|day| NaiveDate::from_ymd_opt(self.year, self.month, day))
            .collect()
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prayer_name_roundtrip() {
        for name in PrayerName::ALL {
            assert_eq!(name.as_str().parse::<PrayerName>().unwrap(), name);
        }
        assert!("witr".parse::<PrayerName>().is_err());
        assert_eq!("Zuhr".parse::<PrayerName>().unwrap(), PrayerName::Dhuhr);
    }

    #[test]
    fn test_time_from_minutes_wraps() {
        assert_eq!(format_hhmm(time_from_minutes(1450)), "00:10");
        assert_eq!(format_hhmm(time_from_minutes(-5)), "23:55");
        assert_eq!(format_hhmm(time_from_minutes(305)), "05:05");
    }

    #[test]
    fn test_location_epsilon() {
        let a = Location::new(21.4225, 39.8262).with_city("Makkah");
        let b = Location::new(21.4230, 39.8265).with_city("Makkah");
        let c = Location::new(21.4250, 39.8262).with_city("Makkah");
        assert!(a.coordinates_match(&b));
        assert!(!a.has_moved_from(&b));
        assert!(!a.coordinates_match(&c));
        assert!(c.has_moved_from(&a));

        let renamed = Location::new(21.4225, 39.8262).with_city("Mecca");
        assert!(renamed.has_moved_from(&a));
    }

    #[test]
    fn test_month_key_days() {
        assert_eq!(MonthKey::new(2024, 2).unwrap().days_in_month(), 29);
        assert_eq!(MonthKey::new(2025, 2).unwrap().days_in_month(), 28);
        assert_eq!(MonthKey::new(2025, 12).unwrap().days_in_month(), 31);
        assert_eq!(MonthKey::new(2025, 12).unwrap().to_string(), "2025-12");
        assert!(MonthKey::new(2025, 13).is_none());
    }

    #[test]
    fn test_prayer_time_serializes_hhmm() {
        let time = NaiveTime::from_hms_opt(5, 7, 0).unwrap();
        let mut prayer = PrayerTime::new(PrayerName::Fajr, time);
        prayer.time = NaiveTime::from_hms_opt(5, 12, 0).unwrap();
        prayer.adjustment = 5;

        let json = serde_json::to_value(&prayer).unwrap();
        assert_eq!(json["name"], "fajr");
        assert_eq!(json["original_time"], "05:07");
        assert_eq!(json["time"], "05:12");

        let back: PrayerTime = serde_json::from_value(json).unwrap();
        assert_eq!(back, prayer);

        prayer.reset();
        assert_eq!(prayer.time, time);
        assert_eq!(prayer.adjustment, 0);
    }
}
