//! Capabilities for running headless on a desktop or server host.
//!
//! Notifications are delivered in-process through a channel, audio and haptics
//! are logged, and the location comes from configuration.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use adhan_common::{Location, NotificationPayload, NotificationRequest};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{AudioPlayer, Clock, Connectivity, GeolocationProvider, HapticPattern, Haptics, NotificationCenter};

const CONNECTIVITY_TIMEOUT_SECONDS: u64 = 5;
const FIRED_CHANNEL_CAPACITY: usize = 32;

/// Reports online when the probe URL answers at all
pub struct HttpConnectivity {
    client: Client,
    probe_url: String,
}

impl HttpConnectivity {
    pub fn new(probe_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(CONNECTIVITY_TIMEOUT_SECONDS))
            .build()
            .context("Failed to build connectivity client")?;
        Ok(Self {
            client,
            probe_url: probe_url.into(),
        })
    }
}

#[async_trait]
impl Connectivity for HttpConnectivity {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Connectivity probe to {} failed: {}", self.probe_url, e);
                false
            }
        }
    }
}

/// Always reports the configured location
pub struct StaticGeolocation {
    location: Location,
}

impl StaticGeolocation {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

#[async_trait]
impl GeolocationProvider for StaticGeolocation {
    async fn current_location(&self) -> anyhow::Result<Location> {
        Ok(self.location.clone())
    }
}

/// A notification that reached its fire time
#[derive(Debug, Clone)]
pub struct FiredNotification {
    pub handle: String,
    pub payload: NotificationPayload,
}

/// In-process notification center: one sleeping task per pending notification
pub struct LocalNotificationCenter {
    clock: Arc<dyn Clock>,
    pending: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
    fired_tx: mpsc::Sender<FiredNotification>,
}

impl LocalNotificationCenter {
    /// Returns the center and the receiving end of fired notifications
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::Receiver<FiredNotification>) {
        let (fired_tx, fired_rx) = mpsc::channel(FIRED_CHANNEL_CAPACITY);
        let center = Self {
            clock,
            pending: Arc::new(Mutex::new(HashMap::new())),
            fired_tx,
        };
        (center, fired_rx)
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl NotificationCenter for LocalNotificationCenter {
    async fn request_permission(&self) -> bool {
        true
    }

    async fn schedule(&self, request: &NotificationRequest) -> anyhow::Result<String> {
        let handle = Uuid::now_v7().to_string();
        let delay = (request.fire_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);

        tracing::info!(
            "Notification {} '{}' scheduled for {} (in {:.1} min)",
            handle,
            request.title,
            request.fire_at.format("%Y-%m-%d %H:%M"),
            delay.as_secs_f64() / 60.0
        );

        // Held across spawn so the task cannot deregister before it is registered
        let mut pending = self.pending.lock().await;

        let task_pending = self.pending.clone();
        let fired_tx = self.fired_tx.clone();
        let fired = FiredNotification {
            handle: handle.clone(),
            payload: request.payload.clone(),
        };
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task_pending.lock().await.remove(&fired.handle);
            if let Err(e) = fired_tx.send(fired).await {
                tracing::warn!("Dropped fired notification, receiver closed: {}", e);
            }
        });

        pending.insert(handle.clone(), task);
        Ok(handle)
    }

    async fn cancel(&self, handle: &str) -> anyhow::Result<()> {
        if let Some(task) = self.pending.lock().await.remove(handle) {
            task.abort();
            tracing::debug!("Notification {} cancelled", handle);
        }
        Ok(())
    }
}

/// Stands in for a real player; logs the calls and remembers what is playing
#[derive(Default)]
pub struct LoggingAudioPlayer {
    playing: std::sync::Mutex<Option<String>>,
}

impl LoggingAudioPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_playing(&self) -> Option<String> {
        self.playing.lock().ok().and_then(|p| p.clone())
    }

    fn set_playing(&self, track: Option<String>) {
        if let Ok(mut playing) = self.playing.lock() {
            *playing = track;
        }
    }
}

#[async_trait]
impl AudioPlayer for LoggingAudioPlayer {
    async fn play(&self, track: &str, volume: f32, fade_in: Duration) -> anyhow::Result<()> {
        tracing::info!(
            "Playing adhan '{}' at volume {:.2} (fade-in {}s)",
            track,
            volume,
            fade_in.as_secs()
        );
        self.set_playing(Some(track.to_string()));
        Ok(())
    }

    async fn pause(&self) -> anyhow::Result<()> {
        tracing::info!("Adhan paused");
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(track) = self.now_playing() {
            tracing::info!("Adhan '{}' stopped", track);
        }
        self.set_playing(None);
        Ok(())
    }

    async fn set_volume(&self, volume: f32) -> anyhow::Result<()> {
        tracing::debug!("Adhan volume set to {:.2}", volume);
        Ok(())
    }

    async fn seek(&self, position: Duration) -> anyhow::Result<()> {
        tracing::debug!("Adhan seek to {}s", position.as_secs());
        Ok(())
    }
}

pub struct LoggingHaptics;

impl Haptics for LoggingHaptics {
    fn vibrate(&self, pattern: HapticPattern) {
        tracing::debug!("Haptic feedback: {:?}", pattern);
    }
}
