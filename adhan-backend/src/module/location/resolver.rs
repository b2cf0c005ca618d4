//! Throttled device-location lookup with change detection
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use adhan_common::Location;
use tokio::sync::RwLock;

use crate::platform::{Clock, GeolocationProvider};

pub const DEFAULT_THROTTLE: Duration = Duration::from_secs(5 * 60);

const NEVER_CHECKED: i64 = i64::MIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    /// The provider answered
    Fresh,
    /// Inside the throttle window, no lookup made
    Throttled,
    /// The provider failed
    Failed,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// Freshly resolved location, `None` when throttled or failed
    pub location: Option<Location>,
    /// The fresh location differs meaningfully from the last known one
    pub changed: bool,
    pub source: ResolutionSource,
}

pub struct LocationResolver {
    provider: Arc<dyn GeolocationProvider>,
    clock: Arc<dyn Clock>,
    throttle: Duration,
    /// Millis since epoch of the last lookup (local wall time)
    last_checked_ms: AtomicI64,
    last_known: RwLock<Option<Location>>,
    default_location: Option<Location>,
}

impl LocationResolver {
    pub fn new(
        provider: Arc<dyn GeolocationProvider>,
        clock: Arc<dyn Clock>,
        throttle: Duration,
        default_location: Option<Location>,
    ) -> Self {
        Self {
            provider,
            clock,
            throttle,
            last_checked_ms: AtomicI64::new(NEVER_CHECKED),
            last_known: RwLock::new(None),
            default_location,
        }
    }

    /// Seed the last-known location, e.g. from a cached day table
    pub async fn remember(&self, location: Location) {
        *self.last_known.write().await = Some(location);
    }

    pub async fn last_known(&self) -> Option<Location> {
        self.last_known.read().await.clone()
    }

    /// Last known location, else the configured default
    pub async fn best_known(&self) -> Option<Location> {
        match self.last_known().await {
            Some(location) => Some(location),
            None => self.default_location.clone(),
        }
    }

    /// Claim the right to look up now. Compare-and-swap so concurrent callers
    /// inside one window make a single lookup between them.
    fn try_claim(&self, force: bool) -> bool {
        let now_ms = self.clock.now().and_utc().timestamp_millis();
        let throttle_ms = self.throttle.as_millis() as i64;

        let mut last = self.last_checked_ms.load(Ordering::Acquire);
        loop {
            if !force && last != NEVER_CHECKED && now_ms.saturating_sub(last) < throttle_ms {
                return false;
            }
            match self.last_checked_ms.compare_exchange(
                last,
                now_ms,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }

    /// Never fails: errors are logged and reported as `ResolutionSource::Failed`
    pub async fn resolve(&self, force: bool) -> Resolution {
        if !self.try_claim(force) {
            tracing::debug!("Location check throttled");
            return Resolution {
                location: None,
                changed: false,
                source: ResolutionSource::Throttled,
            };
        }

        match self.provider.current_location().await {
            Ok(location) => {
                let mut last_known = self.last_known.write().await;
                let changed = match last_known.as_ref() {
                    Some(previous) => location.has_moved_from(previous),
                    None => true,
                };
                if changed {
                    tracing::info!(
                        "Location changed: {} -> {}",
                        last_known
                            .as_ref()
                            .map(|l| l.describe())
                            .unwrap_or_else(|| "unknown".to_string()),
                        location.describe()
                    );
                }
                *last_known = Some(location.clone());
                Resolution {
                    location: Some(location),
                    changed,
                    source: ResolutionSource::Fresh,
                }
            }
            Err(e) => {
                tracing::warn!("Location lookup failed, keeping last known location: {}", e);
                Resolution {
                    location: None,
                    changed: false,
                    source: ResolutionSource::Failed,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedClock, ScriptedGeolocation};
    use chrono::{NaiveDate, NaiveDateTime};

    fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn resolver(geo: Arc<ScriptedGeolocation>, clock: Arc<FixedClock>) -> LocationResolver {
        LocationResolver::new(
            geo,
            clock,
            DEFAULT_THROTTLE,
            Some(Location::new(21.4225, 39.8262).with_city("Makkah")),
        )
    }

    #[tokio::test]
    async fn test_first_resolution_counts_as_change() {
        let geo = Arc::new(ScriptedGeolocation::fixed(Location::new(51.5072, -0.1276).with_city("London")));
        let clock = Arc::new(FixedClock::at(start()));
        let resolver = resolver(geo.clone(), clock);

        let resolution = resolver.resolve(false).await;
        assert_eq!(resolution.source, ResolutionSource::Fresh);
        assert!(resolution.changed);
        assert_eq!(resolver.last_known().await.unwrap().city.as_deref(), Some("London"));
    }

    #[tokio::test]
    async fn test_throttle_window() {
        let geo = Arc::new(ScriptedGeolocation::fixed(Location::new(51.5072, -0.1276)));
        let clock = Arc::new(FixedClock::at(start()));
        let resolver = resolver(geo.clone(), clock.clone());

        resolver.resolve(false).await;
        clock.advance_minutes(4);
        let throttled = resolver.resolve(false).await;
        assert_eq!(throttled.source, ResolutionSource::Throttled);
        assert!(throttled.location.is_none());
        assert_eq!(geo.calls(), 1);

        let forced = resolver.resolve(true).await;
        assert_eq!(forced.source, ResolutionSource::Fresh);
        assert!(!forced.changed);
        assert_eq!(geo.calls(), 2);

        clock.advance_minutes(5);
        resolver.resolve(false).await;
        assert_eq!(geo.calls(), 3);
    }

    #[tokio::test]
    async fn test_small_drift_is_not_a_change() {
        let geo = Arc::new(ScriptedGeolocation::sequence(vec![
            Ok(Location::new(51.5072, -0.1276)),
            Ok(Location::new(51.5075, -0.1279)),
            Ok(Location::new(51.5200, -0.1279)),
        ]));
        let clock = Arc::new(FixedClock::at(start()));
        let resolver = resolver(geo, clock);

        assert!(resolver.resolve(true).await.changed);
        assert!(!resolver.resolve(true).await.changed);
        assert!(resolver.resolve(true).await.changed);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_known_and_default() {
        let geo = Arc::new(ScriptedGeolocation::sequence(vec![Err("permission denied".to_string())]));
        let clock = Arc::new(FixedClock::at(start()));
        let resolver = resolver(geo, clock);

        let resolution = resolver.resolve(true).await;
        assert_eq!(resolution.source, ResolutionSource::Failed);
        assert!(resolution.location.is_none());
        assert!(resolver.last_known().await.is_none());
        assert_eq!(resolver.best_known().await.unwrap().city.as_deref(), Some("Makkah"));
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_one_lookup() {
        let geo = Arc::new(ScriptedGeolocation::fixed(Location::new(51.5072, -0.1276)));
        let clock = Arc::new(FixedClock::at(start()));
        let resolver = Arc::new(resolver(geo.clone(), clock));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let resolver = resolver.clone();
                tokio::spawn(async move { resolver.resolve(false).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(geo.calls(), 1);
    }
}
