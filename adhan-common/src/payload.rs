use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::types::PrayerName;

/// Data attached to a scheduled OS notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationPayload {
    PrayerTime(PrayerTimePayload),
    PrayerSnooze(SnoozePayload),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrayerTimePayload {
    pub prayer: PrayerName,
    /// Unadjusted "HH:MM"
    pub time: String,
    /// Fire time "HH:MM"
    pub adjusted_time: String,
    /// "YYYY-MM-DD" of the prayer day
    pub date: String,
    pub adjustment: i32,
    pub enable_adhan: bool,
    pub selected_audio: String,
    pub volume: f32,
    pub fade_in_duration: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnoozePayload {
    pub prayer: PrayerName,
    pub original_time: String,
    pub snooze_count: u32,
    pub date: String,
}

impl NotificationPayload {
    pub fn prayer(&self) -> PrayerName {
        match self {
            NotificationPayload::PrayerTime(p) => p.prayer,
            NotificationPayload::PrayerSnooze(p) => p.prayer,
        }
    }

    pub fn date(&self) -> &str {
        match self {
            NotificationPayload::PrayerTime(p) => &p.date,
            NotificationPayload::PrayerSnooze(p) => &p.date,
        }
    }

    pub fn is_snooze(&self) -> bool {
        matches!(self, NotificationPayload::PrayerSnooze(_))
    }
}

/// User actions offered on a prayer notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationAction {
    Snooze,
    /// Only offered on a notification that is itself a snooze
    SnoozeAgain,
    Stop,
}

impl NotificationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationAction::Snooze => "SNOOZE",
            NotificationAction::SnoozeAgain => "SNOOZE_AGAIN",
            NotificationAction::Stop => "STOP",
        }
    }

    /// Whether the action may be triggered from a notification carrying `payload`
    pub fn allowed_for(&self, payload: &NotificationPayload) -> bool {
        match self {
            NotificationAction::SnoozeAgain => payload.is_snooze(),
            NotificationAction::Snooze | NotificationAction::Stop => true,
        }
    }
}

impl std::fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "SNOOZE" => Ok(NotificationAction::Snooze),
            "SNOOZE_AGAIN" => Ok(NotificationAction::SnoozeAgain),
            "STOP" => Ok(NotificationAction::Stop),
            _ => Err(format!("Unknown notification action: {}", s)),
        }
    }
}

/// Everything the OS needs to deliver one local notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    /// Device-local wall time
    pub fire_at: NaiveDateTime,
    pub payload: NotificationPayload,
    pub actions: Vec<NotificationAction>,
}
