//! Error taxonomy for fetching, caching and scheduling

use adhan_common::ValidationError;
use thiserror::Error;

/// Failure of a single remote attempt
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("no network connection")]
    Offline,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Timeout) || self.status() == Some(408)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

/// The last attempt's error once retries are exhausted (or cut short)
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{source} (after {retry_count} retries)")]
pub struct RetryError {
    pub source: FetchError,
    pub retry_count: u32,
    pub is_network_error: bool,
    pub is_timeout: bool,
    /// Safe to show to a user as-is
    pub user_message: String,
}

/// Why a cached month could not be served
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheMiss {
    #[error("no cached entry")]
    Absent,
    #[error("entry is not for the current month")]
    NotCurrentMonth,
    #[error("refresh was forced")]
    ForcedRefresh,
    #[error("cached location {cached} does not match requested {requested}")]
    LocationMismatch { cached: String, requested: String },
    #[error("cached method {cached} does not match requested {requested}")]
    MethodMismatch { cached: String, requested: String },
}

#[derive(Debug, Error)]
pub enum AdhanError {
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("remote API error{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    RemoteApi {
        status: Option<u16>,
        retry_count: u32,
        message: String,
    },

    #[error("request timed out after {retry_count} retries")]
    Timeout { retry_count: u32 },

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cache mismatch: {0}")]
    CacheMismatch(#[from] CacheMiss),

    #[error("scheduling failed: {0}")]
    SchedulingFailure(String),

    #[error("invalid prayer-time data: {0}")]
    Decode(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl From<RetryError> for AdhanError {
    fn from(err: RetryError) -> Self {
        match err.source {
            FetchError::Offline => AdhanError::NetworkUnavailable(err.user_message),
            FetchError::Timeout => AdhanError::Timeout {
                retry_count: err.retry_count,
            },
            FetchError::Decode(message) => AdhanError::Decode(message),
            FetchError::Status { status, .. } => AdhanError::RemoteApi {
                status: Some(status),
                retry_count: err.retry_count,
                message: err.user_message,
            },
            FetchError::Network(_) => AdhanError::RemoteApi {
                status: None,
                retry_count: err.retry_count,
                message: err.user_message,
            },
        }
    }
}

impl AdhanError {
    /// Short message for a banner or toast
    pub fn user_message(&self) -> String {
        match self {
            AdhanError::NetworkUnavailable(message) => message.clone(),
            AdhanError::RemoteApi { message, .. } => message.clone(),
            AdhanError::Timeout { .. } => {
                "The request timed out. Please try again.".to_string()
            }
            AdhanError::LocationUnavailable(_) => {
                "Your location could not be determined.".to_string()
            }
            AdhanError::Validation(e) => e.to_string(),
            AdhanError::SchedulingFailure(_) => {
                "Notifications are not permitted on this device.".to_string()
            }
            _ => "Something went wrong while loading prayer times.".to_string(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(
            self,
            AdhanError::NetworkUnavailable(_) | AdhanError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_error_maps_to_taxonomy() {
        let offline = RetryError {
            source: FetchError::Offline,
            retry_count: 1,
            is_network_error: true,
            is_timeout: false,
            user_message: "No internet connection.".to_string(),
        };
        assert!(matches!(
            AdhanError::from(offline),
            AdhanError::NetworkUnavailable(msg) if msg == "No internet connection."
        ));

        let server = RetryError {
            source: FetchError::Status {
                status: 503,
                message: "unavailable".to_string(),
            },
            retry_count: 3,
            is_network_error: false,
            is_timeout: false,
            user_message: "Server error.".to_string(),
        };
        let err = AdhanError::from(server);
        assert!(matches!(
            err,
            AdhanError::RemoteApi {
                status: Some(503),
                retry_count: 3,
                ..
            }
        ));
        assert!(err.to_string().contains("HTTP 503"));
    }

    #[test]
    fn test_request_timeout_status_counts_as_timeout() {
        let err = FetchError::Status {
            status: 408,
            message: String::new(),
        };
        assert!(err.is_timeout());
        assert!(!FetchError::Network("reset".to_string()).is_timeout());
    }
}
