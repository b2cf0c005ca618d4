//! Persisted record of scheduled notifications and snooze progress
use std::collections::BTreeMap;
use std::sync::Arc;

use adhan_common::{PrayerName, SnoozePolicy, date_key, parse_date_key};
use anyhow::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::store::{KeyValueStore, keys, load_json, save_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Prayer,
    Snooze,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledNotification {
    /// Handle returned by the notification center
    pub id: String,
    pub prayer: PrayerName,
    pub scheduled_at: NaiveDateTime,
    #[serde(with = "adhan_common::types::hhmm")]
    pub original_time: NaiveTime,
    pub date: NaiveDate,
    pub is_scheduled: bool,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozeState {
    pub prayer: PrayerName,
    #[serde(with = "adhan_common::types::hhmm")]
    pub original_time: NaiveTime,
    pub snooze_count: u32,
    pub next_time: Option<NaiveDateTime>,
    pub max_snoozes: u32,
    pub snooze_duration_minutes: u32,
}

impl SnoozeState {
    pub fn new(prayer: PrayerName, original_time: NaiveTime, policy: &SnoozePolicy) -> Self {
        Self {
            prayer,
            original_time,
            snooze_count: 0,
            next_time: None,
            max_snoozes: policy.max_snoozes,
            snooze_duration_minutes: policy.duration_minutes,
        }
    }

    pub fn can_snooze(&self) -> bool {
        self.snooze_count < self.max_snoozes
    }
}

type ScheduleMap = BTreeMap<String, Vec<ScheduledNotification>>;
type SnoozeMap = BTreeMap<String, SnoozeState>;

fn snooze_key(date: NaiveDate, prayer: PrayerName) -> String {
    format!("{}:{}", date_key(date), prayer.as_str())
}

/// Every mutation reads, edits and writes a whole map under one lock
pub struct NotificationLedger {
    store: Arc<dyn KeyValueStore>,
    write_lock: Mutex<()>,
}

impl NotificationLedger {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    async fn schedule_map(&self) -> Result<ScheduleMap> {
        Ok(load_json(self.store.as_ref(), keys::SCHEDULED_NOTIFICATIONS)
            .await?
            .unwrap_or_default())
    }

    async fn snooze_map(&self) -> Result<SnoozeMap> {
        Ok(load_json(self.store.as_ref(), keys::SNOOZE_STATES)
            .await?
            .unwrap_or_default())
    }

    pub async fn scheduled_for(&self, date: NaiveDate) -> Result<Vec<ScheduledNotification>> {
        Ok(self
            .schedule_map()
            .await?
            .remove(&date_key(date))
            .unwrap_or_default())
    }

    pub async fn all_scheduled(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.schedule_map().await?.into_values().flatten().collect())
    }

    /// Replace the records for one date
    pub async fn replace_date(&self, date: NaiveDate, notifications: Vec<ScheduledNotification>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.schedule_map().await?;
        if notifications.is_empty() {
            map.remove(&date_key(date));
        } else {
            map.insert(date_key(date), notifications);
        }
        save_json(self.store.as_ref(), keys::SCHEDULED_NOTIFICATIONS, &map).await
    }

    pub async fn record(&self, notification: ScheduledNotification) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.schedule_map().await?;
        map.entry(date_key(notification.date))
            .or_default()
            .push(notification);
        save_json(self.store.as_ref(), keys::SCHEDULED_NOTIFICATIONS, &map).await
    }

    /// Flag matching records as no longer pending
    pub async fn mark_delivered(&self, date: NaiveDate, prayer: PrayerName, kind: NotificationKind) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.schedule_map().await?;
        let mut marked = 0;
        if let Some(entries) = map.get_mut(&date_key(date)) {
            for entry in entries
                .iter_mut()
                .filter(|e| e.prayer == prayer && e.kind == kind && e.is_scheduled)
            {
                entry.is_scheduled = false;
                marked += 1;
            }
        }
        if marked > 0 {
            save_json(self.store.as_ref(), keys::SCHEDULED_NOTIFICATIONS, &map).await?;
        }
        Ok(marked)
    }

    /// Remove and return the pending snooze notifications of one prayer
    pub async fn take_snoozes(&self, date: NaiveDate, prayer: PrayerName) -> Result<Vec<ScheduledNotification>> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.schedule_map().await?;
        let Some(entries) = map.get_mut(&date_key(date)) else {
            return Ok(Vec::new());
        };

        let (taken, kept): (Vec<_>, Vec<_>) = entries
            .drain(..)
            .partition(|e| e.prayer == prayer && e.kind == NotificationKind::Snooze);
        *entries = kept;
        if !taken.is_empty() {
            save_json(self.store.as_ref(), keys::SCHEDULED_NOTIFICATIONS, &map).await?;
        }
        Ok(taken)
    }

    /// Remove and return every record
    pub async fn take_all(&self) -> Result<Vec<ScheduledNotification>> {
        let _guard = self.write_lock.lock().await;
        let map = self.schedule_map().await?;
        self.store.remove(keys::SCHEDULED_NOTIFICATIONS).await?;
        Ok(map.into_values().flatten().collect())
    }

    pub async fn snooze_state(&self, date: NaiveDate, prayer: PrayerName) -> Result<Option<SnoozeState>> {
        Ok(self.snooze_map().await?.remove(&snooze_key(date, prayer)))
    }

    pub async fn save_snooze(&self, date: NaiveDate, state: SnoozeState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.snooze_map().await?;
        map.insert(snooze_key(date, state.prayer), state);
        save_json(self.store.as_ref(), keys::SNOOZE_STATES, &map).await
    }

    pub async fn clear_snooze(&self, date: NaiveDate, prayer: PrayerName) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.snooze_map().await?;
        if map.remove(&snooze_key(date, prayer)).is_some() {
            save_json(self.store.as_ref(), keys::SNOOZE_STATES, &map).await?;
        }
        Ok(())
    }

    pub async fn clear_snoozes(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.store.remove(keys::SNOOZE_STATES).await
    }

    pub async fn last_notification_date(&self) -> Result<Option<NaiveDate>> {
        let raw: Option<String> = load_json(self.store.as_ref(), keys::LAST_NOTIFICATION_DATE).await?;
        Ok(raw.as_deref().and_then(parse_date_key))
    }

    pub async fn set_last_notification_date(&self, date: NaiveDate) -> Result<()> {
        save_json(self.store.as_ref(), keys::LAST_NOTIFICATION_DATE, &date_key(date)).await
    }
}
