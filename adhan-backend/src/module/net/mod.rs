//! Remote-call plumbing shared by every fetcher

mod retry;

pub use retry::{
    ATTEMPT_TIMEOUT, NETWORK_ERROR_FRAGMENTS, NetworkRetryLayer, RetryCondition, RetryOptions,
    is_network_error, is_retryable, user_message,
};
