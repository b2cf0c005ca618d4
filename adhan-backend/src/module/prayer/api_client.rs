//! Remote prayer-time API client (Aladhan-compatible calendar endpoint)
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use adhan_common::{
    CalculationMethod, DayPrayerTimes, Location, MonthKey, PrayerName, PrayerTime,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

use super::fetcher::PrayerTimeSource;
use crate::error::{AdhanError, FetchError};
use crate::module::net::NetworkRetryLayer;

const MAX_ERROR_BODY_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    code: u16,
    #[serde(default)]
    status: String,
    /// A list of days on success, an error string otherwise
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTimings {
    fajr: String,
    dhuhr: String,
    asr: String,
    maghrib: String,
    isha: String,
}

#[derive(Debug, Deserialize)]
struct RawGregorian {
    /// "DD-MM-YYYY"
    date: String,
}

#[derive(Debug, Deserialize)]
struct RawHijriMonth {
    en: String,
}

#[derive(Debug, Deserialize)]
struct RawHijri {
    day: String,
    month: RawHijriMonth,
    year: String,
}

#[derive(Debug, Deserialize)]
struct RawDate {
    gregorian: RawGregorian,
    hijri: RawHijri,
}

#[derive(Debug, Deserialize)]
struct RawDay {
    timings: RawTimings,
    date: RawDate,
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*(\d{1,2}):(\d{2})").expect("valid time regex"))
}

/// Parse an API time such as "05:12 (UTC)" or "05:12 (+03)", dropping the suffix
pub fn parse_api_time(raw: &str) -> Option<NaiveTime> {
    let captures = time_pattern().captures(raw)?;
    let hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

/// Parse an API date in "DD-MM-YYYY"
pub fn parse_api_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%d-%m-%Y").ok()
}

/// Turn a calendar response body into day tables tagged with the request inputs
pub fn parse_calendar_json(
    json: &str,
    location: &Location,
    method: CalculationMethod,
) -> Result<Vec<DayPrayerTimes>, FetchError> {
    let response: CalendarResponse = serde_json::from_str(json)
        .map_err(|e| FetchError::Decode(format!("calendar JSON: {}", e)))?;

    if response.code != 200 {
        let detail = response.data.as_str().unwrap_or_default();
        return Err(FetchError::Status {
            status: response.code,
            message: format!("{} {}", response.status, detail).trim().to_string(),
        });
    }

    let raw_days: Vec<RawDay> = serde_json::from_value(response.data)
        .map_err(|e| FetchError::Decode(format!("calendar days: {}", e)))?;

    raw_days
        .into_iter()
        .map(|raw| {
            let date = parse_api_date(&raw.date.gregorian.date).ok_or_else(|| {
                FetchError::Decode(format!("bad date '{}'", raw.date.gregorian.date))
            })?;

            let timings = [
                (PrayerName::Fajr, &raw.timings.fajr),
                (PrayerName::Dhuhr, &raw.timings.dhuhr),
                (PrayerName::Asr, &raw.timings.asr),
                (PrayerName::Maghrib, &raw.timings.maghrib),
                (PrayerName::Isha, &raw.timings.isha),
            ];
            let prayers = timings
                .into_iter()
                .map(|(name, value)| {
                    parse_api_time(value)
                        .map(|time| PrayerTime::new(name, time))
                        .ok_or_else(|| {
                            FetchError::Decode(format!("bad {} time '{}' on {}", name, value, date))
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;

            Ok(DayPrayerTimes {
                date,
                hijri_date: format!(
                    "{} {} {}",
                    raw.date.hijri.day, raw.date.hijri.month.en, raw.date.hijri.year
                ),
                prayers,
                location: location.clone(),
                method,
            })
        })
        .collect()
}

pub struct AladhanClient {
    client: Client,
    base_url: String,
    retry: Arc<NetworkRetryLayer>,
}

impl AladhanClient {
    pub fn new(
        base_url: impl Into<String>,
        request_timeout: Duration,
        retry: Arc<NetworkRetryLayer>,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent("adhan-backend/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn calendar_url(&self, month: MonthKey) -> String {
        format!("{}/calendar/{}/{}", self.base_url, month.year, month.month)
    }

    fn request_url(&self, month: MonthKey, location: &Location, method: CalculationMethod) -> String {
        format!(
            "{}?latitude={}&longitude={}&method={}",
            self.calendar_url(month),
            location.latitude,
            location.longitude,
            method.id()
        )
    }

    /// Single attempt, returns the raw body
    async fn fetch_attempt(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl PrayerTimeSource for AladhanClient {
    fn name(&self) -> &'static str {
        "aladhan"
    }

    async fn fetch_month(
        &self,
        location: &Location,
        method: CalculationMethod,
        month: MonthKey,
    ) -> Result<Vec<DayPrayerTimes>, AdhanError> {
        if !self.retry.is_online().await {
            tracing::warn!("Skipping prayer-time request for {}: device is offline", month);
            return Err(AdhanError::NetworkUnavailable(
                "No internet connection. Please check your network settings.".to_string(),
            ));
        }

        let url = self.request_url(month, location, method);
        let label = format!("calendar {}", month);
        let body = self
            .retry
            .with_retry(&label, || self.fetch_attempt(&url))
            .await?;

        parse_calendar_json(&body, location, method).map_err(|e| match e {
            FetchError::Status { status, message } => AdhanError::RemoteApi {
                status: Some(status),
                retry_count: 0,
                message,
            },
            other => AdhanError::Decode(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::net::RetryOptions;
    use crate::testing::StaticConnectivity;

    const SAMPLE: &str = r#"{
        "code": 200,
        "status": "OK",
        "data": [
            {
                "timings": {"Fajr": "05:12 (UTC)", "Sunrise": "06:30 (UTC)", "Dhuhr": "12:24 (UTC)", "Asr": "15:47 (UTC)", "Sunset": "18:17 (UTC)", "Maghrib": "18:17 (UTC)", "Isha": "19:47 (UTC)"},
                "date": {
                    "readable": "01 Mar 2025",
                    "gregorian": {"date": "01-03-2025"},
                    "hijri": {"date": "01-09-1446", "day": "1", "month": {"number": 9, "en": "Ramaḍān"}, "year": "1446"}
                }
            },
            {
                "timings": {"Fajr": "05:11 (+03)", "Dhuhr": "12:24 (+03)", "Asr": "15:47 (+03)", "Maghrib": "18:18 (+03)", "Isha": "19:48 (+03)"},
                "date": {
                    "gregorian": {"date": "02-03-2025"},
                    "hijri": {"day": "2", "month": {"en": "Ramaḍān"}, "year": "1446"}
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_api_time_strips_suffix() {
        assert_eq!(parse_api_time("05:12 (UTC)"), NaiveTime::from_hms_opt(5, 12, 0));
        assert_eq!(parse_api_time("9:05"), NaiveTime::from_hms_opt(9, 5, 0));
        assert_eq!(parse_api_time("25:00 (UTC)"), None);
        assert_eq!(parse_api_time("(UTC)"), None);
    }

    #[test]
    fn test_parse_api_date() {
        assert_eq!(parse_api_date("01-03-2025"), NaiveDate::from_ymd_opt(2025, 3, 1));
        assert_eq!(parse_api_date("2025-03-01"), None);
    }

    #[test]
    fn test_parse_calendar_json() {
        let location = Location::new(21.4225, 39.8262).with_city("Makkah");
        let days = parse_calendar_json(SAMPLE, &location, CalculationMethod::UMM_AL_QURA).unwrap();

        assert_eq!(days.len(), 2);
        let first = &days[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(first.hijri_date, "1 Ramaḍān 1446");
        assert_eq!(first.method, CalculationMethod::UMM_AL_QURA);
        assert_eq!(first.location, location);

        let names: Vec<PrayerName> = first.prayers.iter().map(|p| p.name).collect();
        assert_eq!(names, PrayerName::ALL);
        assert_eq!(
            first.get(PrayerName::Isha).unwrap().original_time,
            NaiveTime::from_hms_opt(19, 47, 0).unwrap()
        );
        assert_eq!(days[1].get(PrayerName::Maghrib).unwrap().time.to_string(), "18:18:00");
    }

    #[test]
    fn test_parse_calendar_json_errors() {
        let location = Location::new(0.0, 0.0);
        let err = parse_calendar_json(
            r#"{"code": 400, "status": "Bad Request", "data": "Please specify a valid month"}"#,
            &location,
            CalculationMethod::default(),
        )
        .unwrap_err();
        assert_eq!(err.status(), Some(400));
        assert!(err.to_string().contains("valid month"));

        let broken = SAMPLE.replace("01-03-2025", "2025/03/01");
        assert!(matches!(
            parse_calendar_json(&broken, &location, CalculationMethod::default()),
            Err(FetchError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_offline_fails_fast() {
        let retry = Arc::new(NetworkRetryLayer::new(
            Arc::new(StaticConnectivity::offline()),
            RetryOptions::default(),
        ));
        // Unroutable: any request would fail, but none must be made
        let client = AladhanClient::new("http://127.0.0.1:9", Duration::from_secs(1), retry).unwrap();

        let result = client
            .fetch_month(
                &Location::new(21.4225, 39.8262),
                CalculationMethod::default(),
                MonthKey::new(2025, 3).unwrap(),
            )
            .await;
        assert!(matches!(result, Err(AdhanError::NetworkUnavailable(_))));
    }

    #[test]
    fn test_calendar_url() {
        let retry = Arc::new(NetworkRetryLayer::new(
            Arc::new(StaticConnectivity::online()),
            RetryOptions::default(),
        ));
        let client = AladhanClient::new("https://api.example.com/v1/", Duration::from_secs(1), retry).unwrap();
        assert_eq!(
            client.request_url(
                MonthKey::new(2025, 3).unwrap(),
                &Location::new(21.5, 39.25),
                CalculationMethod::ISNA
            ),
            "https://api.example.com/v1/calendar/2025/3?latitude=21.5&longitude=39.25&method=2"
        );
    }
}
