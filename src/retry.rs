//! Retry policy shared by every STS and IAM call.
//!
//! The SDK clients are built with their own retries disabled, so this is the
//! only layer deciding whether a failed call is attempted again.

use std::{future::Future, time::Duration};

use aws_smithy_types::retry::RetryConfig;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiErrorKind};

/// Attempts allowed for DNS and connection-refused failures, whatever the
/// general maximum is.
pub const NETWORK_ERROR_MAX_ATTEMPTS: u32 = 2;

pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(20);

const EXPIRED_TOKEN_CODES: &[&str] = &["ExpiredToken", "ExpiredTokenException", "RequestExpired"];

const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestThrottledException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "TransactionInProgressException",
    "RequestLimitExceeded",
    "BandwidthLimitExceeded",
    "LimitExceededException",
    "RequestThrottled",
    "SlowDown",
    "PriorRequestNotComplete",
    "EC2ThrottledException",
];

const TRANSIENT_CODES: &[&str] = &[
    "RequestTimeout",
    "RequestTimeoutException",
    "InternalError",
    "InternalFailure",
    "ServiceUnavailable",
    "IDPCommunicationError",
];

const NETWORK_ERROR_MARKERS: &[&str] = &[
    "dns error",
    "failed to lookup address",
    "name or service not known",
    "nodename nor servname",
    "no such host",
    "connection refused",
];

/// How a failed call is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Never retried.
    Terminal,
    /// Retried within [`NETWORK_ERROR_MAX_ATTEMPTS`].
    NetworkRetryable,
    /// Retried within the general maximum.
    Retryable,
}

impl Classification {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Terminal)
    }
}

/// Classify a failed call. Rules are checked in order and the first match
/// wins.
pub fn classify(error: &ApiError) -> Classification {
    if is_expired_token(error) {
        return Classification::Terminal;
    }
    if is_network_error(error) {
        return Classification::NetworkRetryable;
    }
    if is_transient(error) {
        return Classification::Retryable;
    }
    Classification::Terminal
}

fn is_expired_token(error: &ApiError) -> bool {
    if error
        .code()
        .is_some_and(|code| EXPIRED_TOKEN_CODES.contains(&code))
    {
        return true;
    }
    let message = error.message.to_ascii_lowercase();
    message.contains("security token included in the request is expired")
        || message.contains("token has expired")
}

fn is_network_error(error: &ApiError) -> bool {
    if error.kind != ApiErrorKind::Dispatch {
        return false;
    }
    let message = error.message.to_ascii_lowercase();
    NETWORK_ERROR_MARKERS.iter().any(|m| message.contains(m))
}

fn is_transient(error: &ApiError) -> bool {
    match error.kind {
        ApiErrorKind::Dispatch | ApiErrorKind::Timeout => true,
        ApiErrorKind::Response | ApiErrorKind::Construction => false,
        ApiErrorKind::Service => {
            error.status.is_some_and(|s| s >= 500 || s == 429)
                || error.code().is_some_and(|code| {
                    THROTTLING_CODES.contains(&code) || TRANSIENT_CODES.contains(&code)
                })
        }
    }
}

/// One failed attempt of a logical call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub error: ApiError,
    pub retryable: bool,
    /// Whether another attempt followed this one.
    pub retried: bool,
}

/// Outcome of a logical call plus one record per failed attempt, in order.
#[derive(Debug)]
pub struct Attempted<T> {
    pub result: Result<T, ApiError>,
    pub attempts: Vec<AttemptRecord>,
}

impl<T> Attempted<T> {
    /// The final result. A call that needed more than one attempt is logged
    /// with its attempt history first.
    pub fn into_result(self) -> Result<T, ApiError> {
        if let Some(last) = self.attempts.last() {
            debug!(
                "{} made {} attempt(s), {} failed: {}",
                last.error.operation,
                self.attempt_count(),
                self.attempts.len(),
                self.attempts
                    .iter()
                    .map(|a| a.error.code().unwrap_or(a.error.message.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        self.result
    }

    /// Number of times the call was made.
    pub fn attempt_count(&self) -> usize {
        match self.result {
            Ok(_) => self.attempts.len() + 1,
            Err(_) => self.attempts.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    network_max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(RetryConfig::standard().max_attempts())
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            network_max_attempts: NETWORK_ERROR_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn budget(&self, classification: Classification) -> u32 {
        match classification {
            Classification::Terminal => 1,
            Classification::NetworkRetryable => self.network_max_attempts.min(self.max_attempts),
            Classification::Retryable => self.max_attempts,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails terminally, or its budget is
    /// spent.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> Attempted<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let mut attempts = Vec::new();
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => {
                    return Attempted {
                        result: Ok(value),
                        attempts,
                    };
                }
                Err(error) => {
                    let classification = classify(&error);
                    let retry = attempt < self.budget(classification);

                    attempts.push(AttemptRecord {
                        error: error.clone(),
                        retryable: classification.is_retryable(),
                        retried: retry,
                    });

                    if !retry {
                        if attempt > 1 {
                            warn!(
                                "{} failed after {} attempts: {}",
                                error.operation, attempt, error
                            );
                        }
                        return Attempted {
                            result: Err(error),
                            attempts,
                        };
                    }

                    let delay = self.backoff(attempt);
                    debug!(
                        operation = error.operation,
                        attempt,
                        ?classification,
                        ?delay,
                        "Retrying after error: {}",
                        error
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    fn connection_refused() -> ApiError {
        ApiError::dispatch(
            "GetCallerIdentity",
            "dispatch failure: io error: tcp connect error: Connection refused (os error 111)",
        )
    }

    async fn run_failing(policy: RetryPolicy, error: ApiError) -> (Attempted<()>, u32) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = policy
            .execute(|| {
                let error = error.clone();
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(error)
                }
            })
            .await;
        (outcome, calls.load(Ordering::SeqCst))
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&ApiError::service("AssumeRole", "ExpiredToken", "expired").with_status(400)),
            Classification::Terminal
        );
        assert_eq!(
            classify(
                &ApiError::service("GetUser", "InternalError", "boom").with_status(500)
            ),
            Classification::Retryable
        );
        assert_eq!(classify(&connection_refused()), Classification::NetworkRetryable);
        assert_eq!(
            classify(&ApiError::dispatch(
                "GetUser",
                "dns error: failed to lookup address information: Name or service not known"
            )),
            Classification::NetworkRetryable
        );
        assert_eq!(
            classify(&ApiError::timeout("GetUser", "operation timed out")),
            Classification::Retryable
        );
        assert_eq!(
            classify(&ApiError::service("GetUser", "Throttling", "Rate exceeded").with_status(400)),
            Classification::Retryable
        );
        assert_eq!(
            classify(&ApiError::service("GetUser", "AccessDenied", "nope").with_status(403)),
            Classification::Terminal
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_incomplete_response_is_not_retried() {
        let error = ApiError::response("AssumeRole", "AWS STS returned no credentials");
        assert_eq!(classify(&error), Classification::Terminal);

        let (outcome, calls) = run_failing(RetryPolicy::new(5), error).await;
        assert_eq!(calls, 1);
        assert_eq!(outcome.attempt_count(), 1);
        assert!(!outcome.attempts[0].retryable);
    }

    #[test]
    fn test_expired_message_is_terminal_even_when_5xx() {
        let error = ApiError::service(
            "GetCallerIdentity",
            "InvalidClientTokenId",
            "The security token included in the request is expired",
        )
        .with_status(503);
        assert_eq!(classify(&error), Classification::Terminal);
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10)
            .with_backoff(Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(40), Duration::from_secs(2));
    }

    #[test]
    fn test_default_uses_sdk_standard_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 3);
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_is_never_retried() {
        let error = ApiError::service("GetCallerIdentity", "ExpiredTokenException", "expired");
        let (outcome, calls) = run_failing(RetryPolicy::new(25), error).await;

        assert_eq!(calls, 1);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(!outcome.attempts[0].retryable);
        assert!(!outcome.attempts[0].retried);
        assert!(outcome.result.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_refused_capped_at_network_budget() {
        let (outcome, calls) = run_failing(RetryPolicy::new(10), connection_refused()).await;

        assert_eq!(calls, NETWORK_ERROR_MAX_ATTEMPTS);
        assert_eq!(outcome.attempt_count(), NETWORK_ERROR_MAX_ATTEMPTS as usize);
        let retried: Vec<bool> = outcome.attempts.iter().map(|a| a.retried).collect();
        assert_eq!(retried, vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_use_general_budget() {
        let error = ApiError::service("ListRoles", "ServiceUnavailable", "try later").with_status(503);
        let (outcome, calls) = run_failing(RetryPolicy::new(5), error).await;

        assert_eq!(calls, 5);
        assert_eq!(outcome.attempts.len(), 5);
        assert!(outcome.attempts.iter().all(|a| a.retryable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry_records_failures_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let outcome = RetryPolicy::new(3)
            .execute(|| {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(ApiError::timeout("GetCallerIdentity", "timed out"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].retried);
        assert_eq!(outcome.attempt_count(), 2);
        assert_eq!(outcome.into_result().unwrap(), "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_budget_never_exceeds_general_maximum() {
        let (_, calls) = run_failing(RetryPolicy::new(1), connection_refused()).await;
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_history_is_logged() {
        let logs = crate::aws::testing::LogCapture::default();
        let _guard = logs.install();

        let (outcome, calls) = run_failing(
            RetryPolicy::new(2),
            ApiError::service("ListRoles", "Throttling", "Rate exceeded").with_status(400),
        )
        .await;
        assert_eq!(calls, 2);
        assert!(outcome.into_result().is_err());

        let logs = logs.contents();
        assert!(logs.contains("ListRoles made 2 attempt(s), 2 failed: Throttling, Throttling"));
    }
}
