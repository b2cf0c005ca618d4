//! Schedules today's prayer notifications and drives fire/snooze/stop
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use adhan_common::{
    DayPrayerTimes, NotificationAction, NotificationPayload, NotificationRequest, PrayerName,
    PrayerTimePayload, Settings, SnoozePayload, date_key, format_hhmm, parse_date_key, parse_hhmm,
};
use chrono::{Duration, NaiveDate, NaiveTime};
use futures::future::join_all;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{debug, info, warn};

use super::ledger::{NotificationKind, NotificationLedger, ScheduledNotification, SnoozeState};
use super::state::{NotificationEvent, NotificationState};
use crate::error::AdhanError;
use crate::module::prayer::AdjustmentEngine;
use crate::platform::{AudioPlayer, Clock, HapticPattern, Haptics, NotificationCenter};

pub struct NotificationScheduler {
    center: Arc<dyn NotificationCenter>,
    audio: Arc<dyn AudioPlayer>,
    haptics: Arc<dyn Haptics>,
    clock: Arc<dyn Clock>,
    ledger: NotificationLedger,
    permission: OnceCell<bool>,
    date_locks: Mutex<HashMap<NaiveDate, Arc<Mutex<()>>>>,
    states: RwLock<HashMap<(NaiveDate, PrayerName), NotificationState>>,
}

impl NotificationScheduler {
    pub fn new(
        center: Arc<dyn NotificationCenter>,
        audio: Arc<dyn AudioPlayer>,
        haptics: Arc<dyn Haptics>,
        clock: Arc<dyn Clock>,
        ledger: NotificationLedger,
    ) -> Self {
        Self {
            center,
            audio,
            haptics,
            clock,
            ledger,
            permission: OnceCell::new(),
            date_locks: Mutex::new(HashMap::new()),
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn ledger(&self) -> &NotificationLedger {
        &self.ledger
    }

    /// Ask for notification permission. Only the first call reaches the OS.
    pub async fn initialize(&self) -> bool {
        *self
            .permission
            .get_or_init(|| async {
                let granted = self.center.request_permission().await;
                if granted {
                    info!("Notification permission granted");
                } else {
                    warn!("Notification permission denied, scheduling disabled");
                }
                granted
            })
            .await
    }

    async fn permitted(&self, operation: &str) -> bool {
        let granted = self.initialize().await;
        if !granted {
            warn!("Skipping {}: {}", operation, AdhanError::SchedulingFailure("permission denied".to_string()));
        }
        granted
    }

    pub async fn state(&self, date: NaiveDate, prayer: PrayerName) -> NotificationState {
        self.states
            .read()
            .await
            .get(&(date, prayer))
            .copied()
            .unwrap_or_default()
    }

    async fn transition(&self, date: NaiveDate, prayer: PrayerName, event: NotificationEvent) -> Option<NotificationState> {
        let mut states = self.states.write().await;
        let current = states.get(&(date, prayer)).copied().unwrap_or_default();
        match current.on(event) {
            Some(next) => {
                debug!("{} on {}: {} -> {}", prayer, date, current, next);
                states.insert((date, prayer), next);
                Some(next)
            }
            None => {
                debug!("{} on {}: {:?} ignored in state {}", prayer, date, event, current);
                None
            }
        }
    }

    async fn date_lock(&self, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.date_locks.lock().await;
        // Past dates only see late snooze/stop actions; drop their locks once idle
        let today = self.clock.today();
        locks.retain(|d, lock| *d >= today || Arc::strong_count(lock) > 1);
        locks.entry(date).or_default().clone()
    }

    /// Replace today's notifications with one per enabled, still-upcoming prayer
    pub async fn schedule_all_for_today(
        &self,
        day: &DayPrayerTimes,
        settings: &Settings,
    ) -> Result<Vec<ScheduledNotification>, AdhanError> {
        if !self.permitted("scheduling").await {
            return Ok(Vec::new());
        }

        let today = self.clock.today();
        if day.date != today {
            debug!("Not scheduling {}: only {} is scheduled", day.date, today);
            return Ok(Vec::new());
        }

        let lock = self.date_lock(day.date).await;
        let _guard = lock.lock().await;

        self.cancel_all().await?;

        if !settings.notifications_enabled {
            info!("Notifications disabled, nothing scheduled for {}", day.date);
            return Ok(Vec::new());
        }

        let adjusted = AdjustmentEngine::apply_settings(day, settings);
        let now = self.clock.now();
        let mut created = Vec::new();

        for prayer in adjusted.prayers.iter().filter(|p| p.notification_enabled) {
            let fire_at = AdjustmentEngine::adjusted_fire_time(day.date, prayer.original_time, prayer.adjustment);
            if fire_at <= now {
                debug!("Skipping {} at {}: already past", prayer.name, fire_at);
                continue;
            }

            let mut actions = vec![NotificationAction::Stop];
            if settings.snooze.enabled {
                actions.insert(0, NotificationAction::Snooze);
            }

            let request = NotificationRequest {
                title: format!("{} prayer time", prayer.name.label()),
                body: format!("It's time for {} ({})", prayer.name.label(), format_hhmm(prayer.time)),
                fire_at,
                payload: NotificationPayload::PrayerTime(PrayerTimePayload {
                    prayer: prayer.name,
                    time: format_hhmm(prayer.original_time),
                    adjusted_time: format_hhmm(prayer.time),
                    date: day.date_key(),
                    adjustment: prayer.adjustment,
                    enable_adhan: settings.audio.enable_adhan,
                    selected_audio: settings.audio.selected_audio.clone(),
                    volume: settings.audio.volume,
                    fade_in_duration: settings.audio.fade_in_duration,
                }),
                actions,
            };

            match self.center.schedule(&request).await {
                Ok(handle) => {
                    created.push(ScheduledNotification {
                        id: handle,
                        prayer: prayer.name,
                        scheduled_at: fire_at,
                        original_time: prayer.original_time,
                        date: day.date,
                        is_scheduled: true,
                        kind: NotificationKind::Prayer,
                    });
                    self.transition(day.date, prayer.name, NotificationEvent::Schedule)
                        .await;
                }
                Err(e) => warn!("Failed to schedule {} notification: {:#}", prayer.name, e),
            }
        }

        self.ledger.replace_date(day.date, created.clone()).await?;
        info!("Scheduled {} notification(s) for {}", created.len(), day.date);
        Ok(created)
    }

    /// A notification was delivered: start the adhan and haptics
    pub async fn on_fire(&self, payload: &NotificationPayload, settings: &Settings) -> Result<(), AdhanError> {
        let date = payload_date(payload)?;
        let prayer = payload.prayer();

        if self.transition(date, prayer, NotificationEvent::Fire).await.is_none()
            && self.state(date, prayer).await == NotificationState::Cancelled
        {
            info!("Ignoring fired {} notification: already stopped", prayer);
            return Ok(());
        }

        let kind = if payload.is_snooze() {
            NotificationKind::Snooze
        } else {
            NotificationKind::Prayer
        };
        self.ledger.mark_delivered(date, prayer, kind).await?;

        let (enable_adhan, track, volume, fade_in) = match payload {
            NotificationPayload::PrayerTime(p) => (p.enable_adhan, p.selected_audio.clone(), p.volume, p.fade_in_duration),
            NotificationPayload::PrayerSnooze(_) => (
                settings.audio.enable_adhan,
                settings.audio.selected_audio.clone(),
                settings.audio.volume,
                settings.audio.fade_in_duration,
            ),
        };

        if enable_adhan {
            let audio = self.audio.clone();
            tokio::spawn(async move {
                if let Err(e) = audio
                    .play(&track, volume, StdDuration::from_secs(fade_in as u64))
                    .await
                {
                    warn!("Failed to play adhan '{}': {:#}", track, e);
                }
            });
        }

        if settings.vibration_enabled {
            self.haptics.vibrate(HapticPattern::PrayerAlert);
        }

        info!("{} notification fired for {}", prayer, date);
        Ok(())
    }

    /// Schedule one more reminder. `Ok(false)` when snoozing is off or the
    /// ceiling is reached.
    pub async fn snooze(&self, prayer: PrayerName, date: NaiveDate, settings: &Settings) -> Result<bool, AdhanError> {
        self.snooze_from(prayer, date, None, settings).await
    }

    async fn snooze_from(
        &self,
        prayer: PrayerName,
        date: NaiveDate,
        original_time: Option<NaiveTime>,
        settings: &Settings,
    ) -> Result<bool, AdhanError> {
        if !self.permitted("snooze").await {
            return Ok(false);
        }
        if !settings.snooze.enabled {
            debug!("Snooze disabled, ignoring snooze for {}", prayer);
            return Ok(false);
        }

        // Held until the new count is stored so the ceiling holds for concurrent actions
        let lock = self.date_lock(date).await;
        let _guard = lock.lock().await;

        let mut state = match self.ledger.snooze_state(date, prayer).await? {
            Some(state) => state,
            None => {
                let original_time = match original_time {
                    Some(time) => time,
                    None => self.original_time(date, prayer).await?,
                };
                SnoozeState::new(prayer, original_time, &settings.snooze)
            }
        };

        if !state.can_snooze() {
            info!(
                "{} already snoozed {} of {} times",
                prayer, state.snooze_count, state.max_snoozes
            );
            return Ok(false);
        }

        let event = NotificationEvent::Snooze {
            max_snoozes: state.max_snoozes,
        };
        let current = self.state(date, prayer).await;
        if current.on(event).is_none() {
            info!("Not snoozing {} on {}: notification is {}", prayer, date, current);
            return Ok(false);
        }

        if let Err(e) = self.audio.stop().await {
            warn!("Failed to stop audio before snooze: {:#}", e);
        }

        let count = state.snooze_count + 1;
        let fire_at = self.clock.now() + Duration::minutes(state.snooze_duration_minutes as i64);

        let mut actions = vec![NotificationAction::Stop];
        if count < state.max_snoozes {
            actions.insert(0, NotificationAction::SnoozeAgain);
        }
        let request = NotificationRequest {
            title: format!("{} prayer reminder", prayer.label()),
            body: format!(
                "Snoozed {} of {} times, {} was at {}",
                count,
                state.max_snoozes,
                prayer.label(),
                format_hhmm(state.original_time)
            ),
            fire_at,
            payload: NotificationPayload::PrayerSnooze(SnoozePayload {
                prayer,
                original_time: format_hhmm(state.original_time),
                snooze_count: count,
                date: date_key(date),
            }),
            actions,
        };

        let handle = self
            .center
            .schedule(&request)
            .await
            .map_err(|e| AdhanError::SchedulingFailure(format!("snooze for {}: {:#}", prayer, e)))?;

        state.snooze_count = count;
        state.next_time = Some(fire_at);
        self.ledger
            .record(ScheduledNotification {
                id: handle,
                prayer,
                scheduled_at: fire_at,
                original_time: state.original_time,
                date,
                is_scheduled: true,
                kind: NotificationKind::Snooze,
            })
            .await?;
        let max_snoozes = state.max_snoozes;
        self.ledger.save_snooze(date, state).await?;
        self.transition(date, prayer, event).await;

        info!("{} snoozed until {} ({} of {})", prayer, fire_at, count, max_snoozes);
        Ok(true)
    }

    async fn original_time(&self, date: NaiveDate, prayer: PrayerName) -> Result<NaiveTime, AdhanError> {
        let recorded = self
            .ledger
            .scheduled_for(date)
            .await?
            .into_iter()
            .find(|n| n.prayer == prayer && n.kind == NotificationKind::Prayer)
            .map(|n| n.original_time);
        Ok(recorded.unwrap_or_else(|| self.clock.now().time()))
    }

    /// Silence the adhan and drop any pending reminder for this prayer
    pub async fn stop(&self, prayer: PrayerName, date: NaiveDate) -> Result<(), AdhanError> {
        let lock = self.date_lock(date).await;
        let _guard = lock.lock().await;

        if let Err(e) = self.audio.stop().await {
            warn!("Failed to stop audio: {:#}", e);
        }

        for pending in self.ledger.take_snoozes(date, prayer).await? {
            if !pending.is_scheduled {
                continue;
            }
            if let Err(e) = self.center.cancel(&pending.id).await {
                warn!("Failed to cancel snooze {}: {:#}", pending.id, e);
            }
        }
        self.ledger.clear_snooze(date, prayer).await?;
        self.transition(date, prayer, NotificationEvent::Stop).await;

        info!("{} stopped for {}", prayer, date);
        Ok(())
    }

    /// Cancel every tracked notification and forget all snooze progress
    pub async fn cancel_all(&self) -> Result<(), AdhanError> {
        let tracked = self.ledger.take_all().await?;
        let pending: Vec<_> = tracked.iter().filter(|n| n.is_scheduled).collect();
        let results = join_all(pending.iter().map(|n| self.center.cancel(&n.id))).await;

        let mut cancelled = 0;
        for (notification, result) in pending.iter().zip(results) {
            match result {
                Ok(()) => cancelled += 1,
                Err(e) => warn!("Failed to cancel notification {}: {:#}", notification.id, e),
            }
        }
        self.ledger.clear_snoozes().await?;

        // Delivered notifications stay snoozable
        let mut states = self.states.write().await;
        for state in states.values_mut().filter(|s| s.is_active()) {
            if let Some(next) = state.on(NotificationEvent::Cancel) {
                *state = next;
            }
        }

        if cancelled > 0 {
            debug!("Cancelled {} notification(s)", cancelled);
        }
        Ok(())
    }

    /// Dispatch a user action from a delivered notification. `Ok(false)`
    /// when the action was refused.
    pub async fn handle_action(
        &self,
        action: NotificationAction,
        payload: &NotificationPayload,
        settings: &Settings,
    ) -> Result<bool, AdhanError> {
        if !action.allowed_for(payload) {
            warn!("{} is not valid for a {} notification", action, payload.prayer());
            return Ok(false);
        }

        let date = payload_date(payload)?;
        match action {
            NotificationAction::Snooze | NotificationAction::SnoozeAgain => {
                self.snooze_from(payload.prayer(), date, payload_time(payload), settings)
                    .await
            }
            NotificationAction::Stop => {
                self.stop(payload.prayer(), date).await?;
                Ok(true)
            }
        }
    }
}

fn payload_date(payload: &NotificationPayload) -> Result<NaiveDate, AdhanError> {
    parse_date_key(payload.date())
        .ok_or_else(|| AdhanError::Decode(format!("bad payload date '{}'", payload.date())))
}

fn payload_time(payload: &NotificationPayload) -> Option<NaiveTime> {
    match payload {
        NotificationPayload::PrayerTime(p) => parse_hhmm(&p.time),
        NotificationPayload::PrayerSnooze(p) => parse_hhmm(&p.original_time),
    }
}
