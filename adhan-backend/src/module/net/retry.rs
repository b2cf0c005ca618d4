//! Retry with exponential backoff for remote calls.
//!
//! Every attempt runs under its own absolute timeout. Retries are taken only
//! for failures that can plausibly succeed later (5xx, 408/429, timeouts and
//! transport errors); any other 4xx ends the call at once. Before each retry a
//! live connectivity check cuts the loop short when the device is offline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{FetchError, RetryError};
use crate::platform::Connectivity;

/// Lower-cased message fragments that identify a transport failure
pub const NETWORK_ERROR_FRAGMENTS: &[&str] = &[
    "network request failed",
    "network error",
    "failed to fetch",
    "connection refused",
    "connection reset",
    "connection closed",
    "dns error",
    "timed out",
    "timeout",
    "econnrefused",
    "enotfound",
    "etimedout",
    "socket hang up",
];

/// Absolute bound on a single attempt
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

pub type RetryCondition = Arc<dyn Fn(&FetchError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryOptions {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub attempt_timeout: Duration,
    /// Replaces `is_retryable` when set
    pub retry_condition: Option<RetryCondition>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1_000),
            max_delay: Duration::from_millis(10_000),
            backoff_factor: 2.0,
            attempt_timeout: ATTEMPT_TIMEOUT,
            retry_condition: None,
        }
    }
}

impl std::fmt::Debug for RetryOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff_factor", &self.backoff_factor)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("retry_condition", &self.retry_condition.is_some())
            .finish()
    }
}

impl RetryOptions {
    pub fn with_retry_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn(&FetchError) -> bool + Send + Sync + 'static,
    {
        self.retry_condition = Some(Arc::new(condition));
        self
    }

    fn should_retry(&self, err: &FetchError) -> bool {
        match &self.retry_condition {
            Some(condition) => condition(err),
            None => is_retryable(err),
        }
    }

    /// Delay before retry number `retry` (0-based): initial * factor^retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(retry as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor)
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis as u64)
    }
}

/// Transport failure: explicit flags or a known message fragment
pub fn is_network_error(err: &FetchError) -> bool {
    match err {
        FetchError::Offline | FetchError::Network(_) | FetchError::Timeout => true,
        FetchError::Status { .. } => false,
        FetchError::Decode(message) => matches_network_fragment(message),
    }
}

fn matches_network_fragment(message: &str) -> bool {
    let lower = message.to_lowercase();
    NETWORK_ERROR_FRAGMENTS.iter().any(|f| lower.contains(f))
}

/// Default retry policy
pub fn is_retryable(err: &FetchError) -> bool {
    match err {
        FetchError::Status { status, .. } => match *status {
            500..=599 => true,
            408 | 429 => true,
            _ => false,
        },
        FetchError::Timeout | FetchError::Network(_) => true,
        // Offline is settled by the connectivity check, not by waiting
        FetchError::Offline => false,
        FetchError::Decode(message) => matches_network_fragment(message),
    }
}

/// Message for the user, derived from status and connectivity
pub fn user_message(err: &FetchError, online: bool) -> String {
    if !online || matches!(err, FetchError::Offline) {
        return "No internet connection. Please check your network settings.".to_string();
    }
    if err.is_timeout() {
        return "The server took too long to respond. Please try again.".to_string();
    }
    match err.status() {
        Some(429) => "Too many requests. Please wait a moment and try again.".to_string(),
        Some(404) => "Prayer times are not available for this request.".to_string(),
        Some(status) if status >= 500 => {
            "The prayer-time server is having trouble. Please try again later.".to_string()
        }
        Some(_) => "The prayer-time request was rejected.".to_string(),
        None if is_network_error(err) => {
            "A network error occurred. Please check your connection.".to_string()
        }
        None => "Unexpected response from the prayer-time server.".to_string(),
    }
}

/// Wraps any remote operation in retry/backoff/timeout
pub struct NetworkRetryLayer {
    connectivity: Arc<dyn Connectivity>,
    defaults: RetryOptions,
}

impl NetworkRetryLayer {
    pub fn new(connectivity: Arc<dyn Connectivity>, defaults: RetryOptions) -> Self {
        Self {
            connectivity,
            defaults,
        }
    }

    pub fn defaults(&self) -> &RetryOptions {
        &self.defaults
    }

    pub async fn is_online(&self) -> bool {
        self.connectivity.is_online().await
    }

    pub async fn with_retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let options = self.defaults.clone();
        self.with_retry_options(label, operation, &options).await
    }

    pub async fn with_retry_options<T, F, Fut>(
        &self,
        label: &str,
        mut operation: F,
        options: &RetryOptions,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retry_count = 0;

        loop {
            if retry_count > 0 && !self.connectivity.is_online().await {
                tracing::warn!("{}: offline before retry {}, giving up", label, retry_count);
                return Err(self.annotate(FetchError::Offline, retry_count).await);
            }

            let result = match tokio::time::timeout(options.attempt_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Timeout),
            };

            let err = match result {
                Ok(value) => {
                    if retry_count > 0 {
                        tracing::info!("{}: succeeded after {} retries", label, retry_count);
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !options.should_retry(&err) {
                tracing::warn!("{}: non-retryable error: {}", label, err);
                return Err(self.annotate(err, retry_count).await);
            }

            if retry_count >= options.max_retries {
                tracing::error!(
                    "{}: failed after {} attempts: {}",
                    label,
                    retry_count + 1,
                    err
                );
                return Err(self.annotate(err, retry_count).await);
            }

            let delay = options.delay_for(retry_count);
            tracing::warn!(
                "{}: attempt {}/{} failed: {}. Retrying in {:?}...",
                label,
                retry_count + 1,
                options.max_retries + 1,
                err,
                delay
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
        }
    }

    async fn annotate(&self, source: FetchError, retry_count: u32) -> RetryError {
        let network = is_network_error(&source);
        let online = if network {
            self.connectivity.is_online().await
        } else {
            true
        };

        RetryError {
            user_message: user_message(&source, online),
            is_network_error: network,
            is_timeout: source.is_timeout(),
            retry_count,
            source,
        }
    }
}
