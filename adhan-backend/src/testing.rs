//! In-process doubles for the injected capabilities
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use adhan_common::{
    CalculationMethod, DayPrayerTimes, Location, MonthKey, NotificationRequest, PrayerName,
    PrayerTime,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::AdhanError;
use crate::module::prayer::PrayerTimeSource;
use crate::platform::{
    AudioPlayer, Clock, Connectivity, GeolocationProvider, HapticPattern, Haptics,
    NotificationCenter,
};

pub struct FixedClock {
    now: Mutex<NaiveDateTime>,
    offset_minutes: i32,
}

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
            offset_minutes: 180,
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance_minutes(&self, minutes: i64) {
        *self.now.lock().unwrap() += chrono::Duration::minutes(minutes);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }

    fn utc_offset_minutes(&self) -> i32 {
        self.offset_minutes
    }
}

pub struct StaticConnectivity {
    online: AtomicBool,
}

impl StaticConnectivity {
    pub fn online() -> Self {
        Self {
            online: AtomicBool::new(true),
        }
    }

    pub fn offline() -> Self {
        Self {
            online: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connectivity for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Answers from a script, repeating the last entry once exhausted
pub struct ScriptedGeolocation {
    script: Mutex<VecDeque<Result<Location, String>>>,
    last: Mutex<Option<Result<Location, String>>>,
    calls: AtomicUsize,
}

impl ScriptedGeolocation {
    pub fn fixed(location: Location) -> Self {
        Self::sequence(vec![Ok(location)])
    }

    pub fn sequence(script: Vec<Result<Location, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeolocationProvider for ScriptedGeolocation {
    async fn current_location(&self) -> anyhow::Result<Location> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let answer = match next {
            Some(answer) => {
                *self.last.lock().unwrap() = Some(answer.clone());
                answer
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err("no location scripted".to_string())),
        };
        answer.map_err(anyhow::Error::msg)
    }
}

pub struct RecordingNotificationCenter {
    permission: AtomicBool,
    permission_requests: AtomicUsize,
    scheduled: Mutex<Vec<(String, NotificationRequest)>>,
    cancelled: Mutex<HashSet<String>>,
    next_id: AtomicUsize,
    yielding: AtomicBool,
}

impl RecordingNotificationCenter {
    pub fn new() -> Self {
        Self {
            permission: AtomicBool::new(true),
            permission_requests: AtomicUsize::new(0),
            scheduled: Mutex::new(Vec::new()),
            cancelled: Mutex::new(HashSet::new()),
            next_id: AtomicUsize::new(1),
            yielding: AtomicBool::new(false),
        }
    }

    /// Yield to the runtime inside `schedule`, like a real platform round trip
    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.store(yielding, Ordering::SeqCst);
    }

    pub fn set_permission(&self, granted: bool) {
        self.permission.store(granted, Ordering::SeqCst);
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    /// Everything ever scheduled, in order
    pub fn requests(&self) -> Vec<NotificationRequest> {
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .map(|(_, request)| request.clone())
            .collect()
    }

    /// Scheduled and not cancelled
    pub fn active(&self) -> Vec<NotificationRequest> {
        let cancelled = self.cancelled.lock().unwrap();
        self.scheduled
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| !cancelled.contains(id))
            .map(|(_, request)| request.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationCenter for RecordingNotificationCenter {
    async fn request_permission(&self) -> bool {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        self.permission.load(Ordering::SeqCst)
    }

    async fn schedule(&self, request: &NotificationRequest) -> anyhow::Result<String> {
        if self.yielding.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        let id = format!("n{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.scheduled
            .lock()
            .unwrap()
            .push((id.clone(), request.clone()));
        Ok(id)
    }

    async fn cancel(&self, handle: &str) -> anyhow::Result<()> {
        self.cancelled.lock().unwrap().insert(handle.to_string());
        Ok(())
    }
}

pub struct RecordingAudio {
    played: Mutex<Vec<String>>,
    stops: AtomicUsize,
}

impl RecordingAudio {
    pub fn new() -> Self {
        Self {
            played: Mutex::new(Vec::new()),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn played(&self) -> Vec<String> {
        self.played.lock().unwrap().clone()
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPlayer for RecordingAudio {
    async fn play(&self, track: &str, _volume: f32, _fade_in: Duration) -> anyhow::Result<()> {
        self.played.lock().unwrap().push(track.to_string());
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn set_volume(&self, _volume: f32) -> anyhow::Result<()> {
        Ok(())
    }

    async fn seek(&self, _position: Duration) -> anyhow::Result<()> {
        Ok(())
    }
}

pub struct RecordingHaptics {
    patterns: Mutex<Vec<HapticPattern>>,
}

impl RecordingHaptics {
    pub fn new() -> Self {
        Self {
            patterns: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.patterns.lock().unwrap().len()
    }
}

impl Haptics for RecordingHaptics {
    fn vibrate(&self, pattern: HapticPattern) {
        self.patterns.lock().unwrap().push(pattern);
    }
}

/// Fixed times: fajr 05:00, dhuhr 12:15, asr 15:30, maghrib 18:10, isha 19:30
pub fn sample_day(date: NaiveDate, location: &Location) -> DayPrayerTimes {
    let times = [(5, 0), (12, 15), (15, 30), (18, 10), (19, 30)];
    DayPrayerTimes {
        date,
        hijri_date: String::new(),
        prayers: PrayerName::ALL
            .iter()
            .zip(times)
            .map(|(name, (h, m))| PrayerTime::new(*name, NaiveTime::from_hms_opt(h, m, 0).unwrap()))
            .collect(),
        location: location.clone(),
        method: CalculationMethod::default(),
    }
}

pub fn sample_month(key: MonthKey, location: &Location) -> Vec<DayPrayerTimes> {
    key.dates()
        .into_iter()
        .map(|date| sample_day(date, location))
        .collect()
}

/// Counts fetches; serves a canned month or generates sample tables
pub struct CountingSource {
    canned: Option<Vec<DayPrayerTimes>>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl CountingSource {
    pub fn returning(days: Vec<DayPrayerTimes>) -> Self {
        Self {
            canned: Some(days),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn generated() -> Self {
        Self {
            canned: None,
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrayerTimeSource for CountingSource {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch_month(
        &self,
        location: &Location,
        method: CalculationMethod,
        month: MonthKey,
    ) -> Result<Vec<DayPrayerTimes>, AdhanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(AdhanError::RemoteApi {
                status: Some(503),
                retry_count: 3,
                message: "Service unavailable".to_string(),
            });
        }

        Ok(match &self.canned {
            Some(days) => days.clone(),
            None => sample_month(month, location)
                .into_iter()
                .map(|mut day| {
                    day.method = method;
                    day
                })
                .collect(),
        })
    }
}
