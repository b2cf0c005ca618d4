//! Prayer-time retrieval, caching and adjustment

mod adjust;
mod api_client;
mod cache;
mod fetcher;
mod manager;
mod offline;

pub use adjust::AdjustmentEngine;
pub use api_client::{AladhanClient, parse_api_date, parse_api_time, parse_calendar_json};
pub use cache::{MonthCache, MonthCacheEntry};
pub use fetcher::{PrayerTimeFetcher, PrayerTimeSource};
pub use manager::{FetchOutcome, NextPrayer, PrayerTimeService};
pub use offline::{OfflineCalculator, compute_day, hijri_date};
