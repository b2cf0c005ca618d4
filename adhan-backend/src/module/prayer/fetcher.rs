//! Month-at-a-time retrieval of raw prayer times
use std::sync::Arc;

use adhan_common::{CalculationMethod, DayPrayerTimes, Location, MonthKey, PrayerName};
use async_trait::async_trait;

use crate::error::AdhanError;

/// A backend able to produce one calendar month of raw prayer times
#[async_trait]
pub trait PrayerTimeSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_month(
        &self,
        location: &Location,
        method: CalculationMethod,
        month: MonthKey,
    ) -> Result<Vec<DayPrayerTimes>, AdhanError>;
}

/// Front for whichever source is configured. Output is normalized so that
/// nothing downstream ever caches an adjusted time.
pub struct PrayerTimeFetcher {
    source: Arc<dyn PrayerTimeSource>,
}

impl PrayerTimeFetcher {
    pub fn new(source: Arc<dyn PrayerTimeSource>) -> Self {
        Self { source }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub async fn fetch(
        &self,
        location: &Location,
        method: CalculationMethod,
        year: i32,
        month: u32,
    ) -> Result<Vec<DayPrayerTimes>, AdhanError> {
        let key = MonthKey::new(year, month)
            .ok_or_else(|| AdhanError::Decode(format!("invalid month {}-{}", year, month)))?;

        tracing::info!(
            "Fetching prayer times for {} at {} ({}, source: {})",
            key,
            location.describe(),
            method,
            self.source.name()
        );

        let mut days = self.source.fetch_month(location, method, key).await?;
        days.sort_by_key(|day| day.date);
        normalize_month(&mut days, key)?;

        tracing::debug!("Fetched {} days for {}", days.len(), key);
        Ok(days)
    }
}

/// Check the month is complete and strip any adjustment
fn normalize_month(days: &mut [DayPrayerTimes], key: MonthKey) -> Result<(), AdhanError> {
    let expected = key.dates();
    if days.len() != expected.len() {
        return Err(AdhanError::Decode(format!(
            "expected {} days for {}, got {}",
            expected.len(),
            key,
            days.len()
        )));
    }

    for (day, date) in days.iter_mut().zip(expected) {
        if day.date != date {
            return Err(AdhanError::Decode(format!(
                "unexpected date {} in {} (expected {})",
                day.date, key, date
            )));
        }

        let names: Vec<PrayerName> = day.prayers.iter().map(|p| p.name).collect();
        if names != PrayerName::ALL {
            return Err(AdhanError::Decode(format!(
                "day {} does not list the five prayers in order: {:?}",
                day.date, names
            )));
        }

        for prayer in day.prayers.iter_mut() {
            prayer.reset();
        }
    }

    Ok(())
}
