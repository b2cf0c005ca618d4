//! Location-aware access to day tables, backed by the month cache
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use adhan_common::{
    DayPrayerTimes, Location, LocationMode, MonthKey, PrayerName, Settings, ValidationError,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::adjust::AdjustmentEngine;
use super::cache::MonthCache;
use super::fetcher::PrayerTimeFetcher;
use crate::error::AdhanError;
use crate::module::location::LocationResolver;
use crate::platform::Clock;

/// Result of asking for today's table
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Fresh(DayPrayerTimes),
    /// The fetch failed but an older table is available
    Stale { day: DayPrayerTimes, message: String },
}

impl FetchOutcome {
    pub fn day(&self) -> &DayPrayerTimes {
        match self {
            FetchOutcome::Fresh(day) => day,
            FetchOutcome::Stale { day, .. } => day,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, FetchOutcome::Stale { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextPrayer {
    pub name: PrayerName,
    pub date: NaiveDate,
    pub at: NaiveDateTime,
}

pub struct PrayerTimeService {
    resolver: Arc<LocationResolver>,
    fetcher: PrayerTimeFetcher,
    cache: MonthCache,
    clock: Arc<dyn Clock>,
    last_good: RwLock<Option<DayPrayerTimes>>,
    /// Set when the device moved since the schedule was last built
    location_moved: AtomicBool,
}

impl PrayerTimeService {
    pub fn new(resolver: Arc<LocationResolver>, fetcher: PrayerTimeFetcher, clock: Arc<dyn Clock>) -> Self {
        Self {
            resolver,
            fetcher,
            cache: MonthCache::new(),
            clock,
            last_good: RwLock::new(None),
            location_moved: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &MonthCache {
        &self.cache
    }

    /// Location to compute for. A meaningful change clears the cache.
    pub async fn current_location(&self, settings: &Settings, force: bool) -> Result<Location, AdhanError> {
        if settings.location_mode == LocationMode::Manual {
            let manual = settings
                .manual_location
                .clone()
                .ok_or(ValidationError::MissingManualLocation)?;

            let moved = match self.resolver.last_known().await {
                Some(previous) => manual.has_moved_from(&previous),
                None => false,
            };
            if moved {
                info!("Manual location set to {}, clearing cache", manual.describe());
                self.cache.clear().await;
            }
            self.resolver.remember(manual.clone()).await;
            return Ok(manual);
        }

        let had_fix = self.resolver.last_known().await.is_some();
        let resolution = self.resolver.resolve(force).await;
        if resolution.changed {
            self.cache.clear().await;
            if had_fix {
                self.location_moved.store(true, Ordering::SeqCst);
            }
        }

        match resolution.location {
            Some(location) => Ok(location),
            None => self.resolver.best_known().await.ok_or_else(|| {
                AdhanError::LocationUnavailable("no location fix and no default configured".to_string())
            }),
        }
    }

    /// Whether a detected move is still waiting for a schedule rebuild. Clears the flag.
    pub fn take_location_change(&self) -> bool {
        self.location_moved.swap(false, Ordering::SeqCst)
    }

    /// Keep a move pending, e.g. when the rebuild it triggered failed
    pub fn flag_location_change(&self) {
        self.location_moved.store(true, Ordering::SeqCst);
    }

    /// Every day of a month. Only the current month is served from or stored in the cache.
    pub async fn month(&self, key: MonthKey, settings: &Settings, force: bool) -> Result<Vec<DayPrayerTimes>, AdhanError> {
        let location = self.current_location(settings, force).await?;
        let method = settings.calculation_method;
        let is_current = key == MonthKey::from_date(self.clock.today());

        if is_current {
            match self.cache.lookup(key, &location, method, force).await {
                Ok(days) => {
                    debug!("Serving {} from cache", key);
                    return Ok(days);
                }
                Err(miss) => debug!("Cache miss for {}: {}", key, miss),
            }
        }

        let days = self
            .fetcher
            .fetch(&location, method, key.year, key.month)
            .await?;
        if is_current {
            self.cache
                .put(key, days.clone(), true, self.clock.now())
                .await;
        }
        Ok(days)
    }

    /// Raw (unadjusted) table for one date
    pub async fn day(&self, date: NaiveDate, settings: &Settings, force: bool) -> Result<DayPrayerTimes, AdhanError> {
        let days = self.month(MonthKey::from_date(date), settings, force).await?;
        let day = days
            .into_iter()
            .find(|day| day.date == date)
            .ok_or_else(|| AdhanError::Decode(format!("no prayer times for {}", date)))?;

        if date == self.clock.today() {
            *self.last_good.write().await = Some(day.clone());
        }
        Ok(day)
    }

    /// Today's adjusted table, falling back to the last good one when the fetch fails
    pub async fn today_adjusted(&self, settings: &Settings, force: bool) -> Result<FetchOutcome, AdhanError> {
        let today = self.clock.today();
        match self.day(today, settings, force).await {
            Ok(day) => Ok(FetchOutcome::Fresh(AdjustmentEngine::apply_settings(&day, settings))),
            Err(e) => {
                let last_good = self.last_good.read().await.clone();
                match last_good {
                    Some(day) => {
                        warn!("Using stale prayer times from {}: {}", day.date, e);
                        Ok(FetchOutcome::Stale {
                            day: AdjustmentEngine::apply_settings(&day, settings),
                            message: e.user_message(),
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Next adjusted prayer after now, rolling to tomorrow's fajr after isha
    pub async fn next_prayer(&self, settings: &Settings) -> Result<NextPrayer, AdhanError> {
        let now = self.clock.now();
        let today = now.date();
        let adjustments = settings.adjustments();

        let day = self.day(today, settings, false).await?;
        for prayer in &day.prayers {
            let at = AdjustmentEngine::adjusted_fire_time(
                today,
                prayer.original_time,
                adjustments.minutes_for(prayer.name),
            );
            if at > now {
                return Ok(NextPrayer { name: prayer.name, date: today, at });
            }
        }

        let tomorrow = today + Duration::days(1);
        let next_day = self.day(tomorrow, settings, false).await?;
        let fajr = next_day
            .get(PrayerName::Fajr)
            .ok_or_else(|| AdhanError::Decode(format!("no fajr on {}", tomorrow)))?;
        Ok(NextPrayer {
            name: PrayerName::Fajr,
            date: tomorrow,
            at: AdjustmentEngine::adjusted_fire_time(
                tomorrow,
                fajr.original_time,
                adjustments.minutes_for(PrayerName::Fajr),
            ),
        })
    }

    /// Drop cached data after a location or method change
    pub async fn invalidate(&self) {
        self.cache.clear().await;
        *self.last_good.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::location::DEFAULT_THROTTLE;
    use crate::testing::{CountingSource, FixedClock, ScriptedGeolocation};
    use adhan_common::{CalculationMethod, format_hhmm};

    fn morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(4, 0, 0)
            .unwrap()
    }

    struct Fixture {
        service: PrayerTimeService,
        source: Arc<CountingSource>,
        geo: Arc<ScriptedGeolocation>,
        clock: Arc<FixedClock>,
    }

    fn fixture(geo: ScriptedGeolocation) -> Fixture {
        let clock = Arc::new(FixedClock::at(morning()));
        let geo = Arc::new(geo);
        let source = Arc::new(CountingSource::generated());
        let resolver = Arc::new(LocationResolver::new(
            geo.clone(),
            clock.clone(),
            DEFAULT_THROTTLE,
            None,
        ));
        let service = PrayerTimeService::new(
            resolver,
            PrayerTimeFetcher::new(source.clone()),
            clock.clone(),
        );
        Fixture { service, source, geo, clock }
    }

    #[tokio::test]
    async fn test_current_month_is_fetched_once() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let settings = Settings::default();

        let first = f.service.day(f.clock.today(), &settings, false).await.unwrap();
        let second = f.service.day(f.clock.today(), &settings, false).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.source.calls(), 1);

        f.service.day(f.clock.today(), &settings, true).await.unwrap();
        assert_eq!(f.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_other_months_are_always_fetched() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let settings = Settings::default();
        let april = MonthKey::new(2025, 4).unwrap();

        f.service.month(april, &settings, false).await.unwrap();
        f.service.month(april, &settings, false).await.unwrap();
        assert_eq!(f.source.calls(), 2);
        assert_eq!(f.service.cache().len().await, 0);
    }

    #[tokio::test]
    async fn test_moving_refetches() {
        let f = fixture(ScriptedGeolocation::sequence(vec![
            Ok(Location::new(21.4225, 39.8262)),
            Ok(Location::new(21.4300, 39.8262)),
        ]));
        let settings = Settings::default();

        f.service.day(f.clock.today(), &settings, false).await.unwrap();
        // The first fix is not a move
        assert!(!f.service.take_location_change());

        f.clock.advance_minutes(6);
        let moved = f.service.day(f.clock.today(), &settings, false).await.unwrap();

        assert_eq!(f.geo.calls(), 2);
        assert_eq!(f.source.calls(), 2);
        assert!((moved.location.latitude - 21.43).abs() < 1e-9);
        assert!(f.service.take_location_change());
        assert!(!f.service.take_location_change());
    }

    #[tokio::test]
    async fn test_manual_location_bypasses_provider() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let mut settings = Settings::default();
        settings.location_mode = LocationMode::Manual;
        settings.manual_location = Some(Location::new(51.5072, -0.1276).with_city("London"));

        let day = f.service.day(f.clock.today(), &settings, false).await.unwrap();
        assert_eq!(day.location.city.as_deref(), Some("London"));
        assert_eq!(f.geo.calls(), 0);

        settings.manual_location = None;
        let err = f.service.day(f.clock.today(), &settings, false).await.unwrap_err();
        assert!(matches!(err, AdhanError::Validation(_)));
    }

    #[tokio::test]
    async fn test_method_change_refetches() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let mut settings = Settings::default();

        f.service.day(f.clock.today(), &settings, false).await.unwrap();
        settings.calculation_method = CalculationMethod::EGYPTIAN;
        let day = f.service.day(f.clock.today(), &settings, false).await.unwrap();

        assert_eq!(day.method, CalculationMethod::EGYPTIAN);
        assert_eq!(f.source.calls(), 2);
    }

    #[tokio::test]
    async fn test_stale_fallback() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let settings = Settings::default();

        let fresh = f.service.today_adjusted(&settings, false).await.unwrap();
        assert!(!fresh.is_stale());

        f.source.set_failing(true);
        let stale = f.service.today_adjusted(&settings, true).await.unwrap();
        assert!(stale.is_stale());
        assert_eq!(stale.day().date, f.clock.today());

        f.service.invalidate().await;
        assert!(f.service.today_adjusted(&settings, true).await.is_err());
    }

    #[tokio::test]
    async fn test_next_prayer_rolls_to_tomorrow() {
        let f = fixture(ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)));
        let mut settings = Settings::default();
        settings.set_adjustment(PrayerName::Fajr, 5).unwrap();

        // Sample tables put fajr at 05:00
        let next = f.service.next_prayer(&settings).await.unwrap();
        assert_eq!(next.name, PrayerName::Fajr);
        assert_eq!(format_hhmm(next.at.time()), "05:05");

        f.clock.set(
            NaiveDate::from_ymd_opt(2025, 3, 31)
                .unwrap()
                .and_hms_opt(23, 0, 0)
                .unwrap(),
        );
        let next = f.service.next_prayer(&settings).await.unwrap();
        assert_eq!(next.name, PrayerName::Fajr);
        assert_eq!(next.date, NaiveDate::from_ymd_opt(2025, 4, 1).unwrap());
    }
}
