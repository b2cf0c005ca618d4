//! Once-per-day re-derivation of today's notification schedule
//!
//! Two background loops keep the schedule current:
//! - a wake loop firing shortly after each local midnight
//! - a periodic check that catches days missed while suspended

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::DailyConfig;
use crate::module::notify::NotificationScheduler;
use crate::module::prayer::PrayerTimeService;
use crate::platform::Clock;
use crate::settings::SettingsStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// Today's schedule was rebuilt with this many notifications
    Recreated(usize),
    /// Already done for today
    UpToDate,
    /// Nothing changed; the previous schedule stays in place
    Failed(String),
}

pub struct DailyRecreationTask {
    config: DailyConfig,
    settings: Arc<SettingsStore>,
    prayers: Arc<PrayerTimeService>,
    scheduler: Arc<NotificationScheduler>,
    clock: Arc<dyn Clock>,
    running: Mutex<()>,
}

impl DailyRecreationTask {
    pub fn new(
        config: DailyConfig,
        settings: Arc<SettingsStore>,
        prayers: Arc<PrayerTimeService>,
        scheduler: Arc<NotificationScheduler>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            settings,
            prayers,
            scheduler,
            clock,
            running: Mutex::new(()),
        }
    }

    /// Recreate unless today's schedule was already built for the current location
    pub async fn run_if_needed(&self) -> RecreateOutcome {
        let today = self.clock.today();
        let moved = self.location_moved().await;
        match self.scheduler.ledger().last_notification_date().await {
            Ok(Some(last)) if last == today && moved => {
                tracing::info!("Location changed, rebuilding schedule for {}", today)
            }
            Ok(Some(last)) if last == today => {
                tracing::debug!("Schedule for {} already in place", today);
                return RecreateOutcome::UpToDate;
            }
            Ok(last) => tracing::info!(
                "Schedule last built for {}, rebuilding for {}",
                last.map(|d| d.to_string()).unwrap_or_else(|| "never".to_string()),
                today
            ),
            Err(e) => tracing::warn!("Could not read last schedule date, rebuilding: {:#}", e),
        }

        let outcome = self.recreate(false).await;
        if moved && matches!(outcome, RecreateOutcome::Failed(_)) {
            self.prayers.flag_location_change();
        }
        outcome
    }

    /// Look the location up (throttled) and report a move not yet scheduled for
    async fn location_moved(&self) -> bool {
        match self.settings.load().await {
            Ok(settings) => {
                if let Err(e) = self.prayers.current_location(&settings, false).await {
                    tracing::debug!("Location check before rebuild failed: {}", e);
                }
            }
            Err(e) => tracing::debug!("Location check skipped, settings unavailable: {}", e),
        }
        self.prayers.take_location_change()
    }

    /// Rebuild even if today was already done, e.g. after a settings change
    pub async fn force_recreate(&self) -> RecreateOutcome {
        self.recreate(false).await
    }

    /// Fetch today's table, then replace the schedule. A failed fetch leaves
    /// the existing notifications untouched.
    pub async fn recreate(&self, refresh: bool) -> RecreateOutcome {
        let _running = self.running.lock().await;
        let today = self.clock.today();

        let settings = match self.settings.load().await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::error!("Daily recreation: failed to load settings: {}", e);
                return RecreateOutcome::Failed(e.to_string());
            }
        };

        let day = match self.prayers.day(today, &settings, refresh).await {
            Ok(day) => day,
            Err(e) => {
                tracing::warn!(
                    "Daily recreation: no prayer times for {}, keeping current schedule: {}",
                    today,
                    e
                );
                return RecreateOutcome::Failed(e.user_message());
            }
        };

        // This table already reflects any move detected while fetching it
        self.prayers.take_location_change();

        let created = match self.scheduler.schedule_all_for_today(&day, &settings).await {
            Ok(created) => created,
            Err(e) => {
                tracing::error!("Daily recreation: scheduling failed: {}", e);
                return RecreateOutcome::Failed(e.to_string());
            }
        };

        if let Err(e) = self
            .scheduler
            .ledger()
            .set_last_notification_date(today)
            .await
        {
            tracing::warn!("Failed to store last schedule date: {:#}", e);
        }

        tracing::info!("Daily recreation for {} scheduled {} notification(s)", today, created.len());
        RecreateOutcome::Recreated(created.len())
    }

    /// Next local midnight plus the configured offset
    pub fn calculate_next_wake(now: NaiveDateTime, offset_minutes: u32) -> NaiveDateTime {
        let offset = ChronoDuration::minutes(offset_minutes as i64);
        let today_wake = now.date().and_time(NaiveTime::MIN) + offset;
        if today_wake > now {
            today_wake
        } else {
            (now.date() + ChronoDuration::days(1)).and_time(NaiveTime::MIN) + offset
        }
    }

    /// Spawn the wake loop and the periodic check
    pub fn start(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        tracing::info!(
            "Starting daily recreation (wake {} min after midnight, check every {} min)",
            self.config.wake_offset_minutes,
            self.config.check_interval_minutes
        );

        let wake = {
            let task = self.clone();
            tokio::spawn(async move { task.wake_loop().await })
        };
        let check = {
            let task = self.clone();
            tokio::spawn(async move { task.check_loop().await })
        };
        vec![wake, check]
    }

    async fn wake_loop(&self) {
        loop {
            let now = self.clock.now();
            let next = Self::calculate_next_wake(now, self.config.wake_offset_minutes);
            let sleep_duration = (next - now).to_std().unwrap_or(Duration::from_secs(60));

            tracing::info!(
                "Next schedule rebuild at {} (in {:.1} h)",
                next.format("%Y-%m-%d %H:%M:%S"),
                sleep_duration.as_secs_f64() / 3600.0
            );
            tokio::time::sleep(sleep_duration).await;

            self.run_if_needed().await;
        }
    }

    async fn check_loop(&self) {
        let interval = Duration::from_secs(self.config.check_interval_minutes.max(1) * 60);
        loop {
            tokio::time::sleep(interval).await;
            self.run_if_needed().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::location::{DEFAULT_THROTTLE, LocationResolver};
    use crate::module::notify::NotificationLedger;
    use crate::module::prayer::PrayerTimeFetcher;
    use crate::store::MemoryStore;
    use crate::testing::{
        CountingSource, FixedClock, RecordingAudio, RecordingHaptics, RecordingNotificationCenter,
        ScriptedGeolocation,
    };
    use adhan_common::Location;
    use chrono::NaiveDate;

    struct Fixture {
        task: Arc<DailyRecreationTask>,
        center: Arc<RecordingNotificationCenter>,
        source: Arc<CountingSource>,
        clock: Arc<FixedClock>,
    }

    fn at(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .unwrap()
            .and_hms_opt(hour, minute, 0)
            .unwrap()
    }

    fn fixture(now: NaiveDateTime) -> Fixture {
        fixture_with(now, ScriptedGeolocation::fixed(Location::new(21.4225, 39.8262)))
    }

    fn fixture_with(now: NaiveDateTime, geolocation: ScriptedGeolocation) -> Fixture {
        let clock = Arc::new(FixedClock::at(now));
        let store = Arc::new(MemoryStore::new());
        let center = Arc::new(RecordingNotificationCenter::new());
        let source = Arc::new(CountingSource::generated());

        let resolver = Arc::new(LocationResolver::new(
            Arc::new(geolocation),
            clock.clone(),
            DEFAULT_THROTTLE,
            None,
        ));
        let prayers = Arc::new(PrayerTimeService::new(
            resolver,
            PrayerTimeFetcher::new(source.clone()),
            clock.clone(),
        ));
        let scheduler = Arc::new(NotificationScheduler::new(
            center.clone(),
            Arc::new(RecordingAudio::new()),
            Arc::new(RecordingHaptics::new()),
            clock.clone(),
            NotificationLedger::new(store.clone()),
        ));
        let task = Arc::new(DailyRecreationTask::new(
            DailyConfig::default(),
            Arc::new(SettingsStore::new(store)),
            prayers,
            scheduler,
            clock.clone(),
        ));
        Fixture { task, center, source, clock }
    }

    #[tokio::test]
    async fn test_once_per_day() {
        let f = fixture(at(10, 0, 1));

        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::Recreated(5));
        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::UpToDate);
        assert_eq!(f.center.active().len(), 5);

        f.clock.set(at(11, 0, 1));
        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::Recreated(5));
        assert_eq!(f.center.active().len(), 5);
        assert!(f.center.active().iter().all(|r| r.fire_at.date() == at(11, 0, 0).date()));
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_schedule() {
        let f = fixture(at(10, 0, 1));
        f.task.run_if_needed().await;
        let before = f.center.active();

        f.clock.set(at(11, 0, 1));
        f.source.set_failing(true);
        // March is cached, force a refetch to reach the failing source
        let outcome = f.task.recreate(true).await;

        assert!(matches!(outcome, RecreateOutcome::Failed(_)));
        assert_eq!(f.center.active(), before);
        assert_eq!(
            f.task.scheduler.ledger().last_notification_date().await.unwrap(),
            Some(at(10, 0, 0).date())
        );
    }

    #[tokio::test]
    async fn test_force_recreate_is_idempotent() {
        let f = fixture(at(10, 12, 0));
        f.task.run_if_needed().await;
        let first: Vec<_> = f.center.active().into_iter().map(|r| r.fire_at).collect();

        f.task.force_recreate().await;
        let second: Vec<_> = f.center.active().into_iter().map(|r| r.fire_at).collect();
        assert_eq!(first, second);
        assert_eq!(f.source.calls(), 1);
    }

    #[test]
    fn test_calculate_next_wake() {
        assert_eq!(
            DailyRecreationTask::calculate_next_wake(at(10, 13, 45), 1),
            at(11, 0, 1)
        );
        assert_eq!(
            DailyRecreationTask::calculate_next_wake(at(10, 0, 0), 1),
            at(10, 0, 1)
        );
        assert_eq!(
            DailyRecreationTask::calculate_next_wake(at(31, 23, 59), 0),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_wake_loop_rebuilds_after_midnight() {
        let f = fixture(at(10, 23, 59));
        f.task.run_if_needed().await;
        let handles = f.task.start();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        // The clock double does not follow tokio time, so move it by hand
        f.clock.set(at(11, 0, 1));
        tokio::time::sleep(Duration::from_secs(3 * 60)).await;

        assert_eq!(
            f.task.scheduler.ledger().last_notification_date().await.unwrap(),
            Some(at(11, 0, 0).date())
        );
        for handle in handles {
            handle.abort();
        }
    }

    #[tokio::test]
    async fn test_detected_move_rebuilds_same_day() {
        let f = fixture_with(
            at(10, 0, 1),
            ScriptedGeolocation::sequence(vec![
                Ok(Location::new(21.4225, 39.8262)),
                Ok(Location::new(24.4672, 39.6111)),
            ]),
        );
        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::Recreated(5));

        f.clock.advance_minutes(10);
        f.source.set_failing(true);
        assert!(matches!(f.task.run_if_needed().await, RecreateOutcome::Failed(_)));

        // The move stays pending until a rebuild succeeds
        f.clock.advance_minutes(10);
        f.source.set_failing(false);
        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::Recreated(5));

        f.clock.advance_minutes(10);
        assert_eq!(f.task.run_if_needed().await, RecreateOutcome::UpToDate);
        assert_eq!(f.source.calls(), 3);
    }
}
