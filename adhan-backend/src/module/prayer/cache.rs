//! In-memory month cache. Only the current calendar month is ever retained.
use std::collections::HashMap;

use adhan_common::{CalculationMethod, DayPrayerTimes, Location, MonthKey};
use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::CacheMiss;

#[derive(Debug, Clone, PartialEq)]
pub struct MonthCacheEntry {
    pub key: MonthKey,
    pub days: Vec<DayPrayerTimes>,
    pub is_current_month: bool,
    pub fetched_at: NaiveDateTime,
    pub location: Location,
    pub method: CalculationMethod,
}

#[derive(Default)]
pub struct MonthCache {
    entries: RwLock<HashMap<MonthKey, MonthCacheEntry>>,
}

impl MonthCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry. Any non-current entries found are dropped first.
    pub async fn get(&self, key: MonthKey) -> Option<MonthCacheEntry> {
        self.clear_non_current().await;
        self.entries.read().await.get(&key).cloned()
    }

    /// Store a month. Returns false (and stores nothing) unless it is the
    /// current month with at least one day.
    pub async fn put(
        &self,
        key: MonthKey,
        days: Vec<DayPrayerTimes>,
        is_current: bool,
        fetched_at: NaiveDateTime,
    ) -> bool {
        if !is_current {
            debug!("Not caching {}: not the current month", key);
            self.clear_non_current().await;
            return false;
        }

        let Some(first) = days.first() else {
            debug!("Not caching {}: no days", key);
            return false;
        };

        let entry = MonthCacheEntry {
            key,
            location: first.location.clone(),
            method: first.method,
            days,
            is_current_month: true,
            fetched_at,
        };

        let mut entries = self.entries.write().await;
        // A new current month supersedes whatever was current before
        entries.retain(|cached, _| *cached == key);
        entries.insert(key, entry);
        info!("Cached prayer times for {}", key);
        true
    }

    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        if !entries.is_empty() {
            info!("Cleared {} cached month(s)", entries.len());
        }
        entries.clear();
    }

    pub async fn clear_non_current(&self) {
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.is_current_month);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Serve a month only when it is current, not forced, and computed for
    /// the same location and method.
    pub async fn lookup(
        &self,
        key: MonthKey,
        location: &Location,
        method: CalculationMethod,
        force: bool,
    ) -> Result<Vec<DayPrayerTimes>, CacheMiss> {
        if force {
            return Err(CacheMiss::ForcedRefresh);
        }

        let entry = self.get(key).await.ok_or(CacheMiss::Absent)?;
        if !entry.is_current_month {
            return Err(CacheMiss::NotCurrentMonth);
        }
        if !entry.location.coordinates_match(location) {
            return Err(CacheMiss::LocationMismatch {
                cached: entry.location.describe(),
                requested: location.describe(),
            });
        }
        if entry.method != method {
            return Err(CacheMiss::MethodMismatch {
                cached: entry.method.to_string(),
                requested: method.to_string(),
            });
        }

        Ok(entry.days)
    }
}
