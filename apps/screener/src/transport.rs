//! Resilient transport — retry with exponential backoff and jitter around any
//! outbound call.
//!
//! ARCHITECTURAL RULE: every network round-trip (crawler capability, reasoning
//! capability) goes through [`execute`]. No other module implements its own
//! retry loop.
//!
//! The executor is generic over the request function: each attempt invokes the
//! closure, classifies the failure, and either backs off and retries
//! (`Retryable`) or short-circuits (`Fatal`). Attempt count and cumulative
//! delay are both capped by the policy.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Retry policy for one logical outbound call.
///
/// All knobs come from configuration; see `Config::from_env`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub base_backoff: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub multiplier: f64,
    /// Jitter fraction: each delay is scaled by a uniform factor in
    /// `[1 - jitter, 1 + jitter]`.
    pub jitter: f64,
    /// Timeout applied to every individual attempt.
    pub attempt_timeout: Duration,
    /// Cap on the sum of backoff delays; once the budget would be exceeded,
    /// the call gives up even if attempts remain.
    pub max_total_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.25,
            attempt_timeout: Duration::from_secs(15),
            max_total_delay: Duration::from_secs(60),
        }
    }
}

/// Whether a failed attempt is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 5xx, 429, timeout, connection reset — try again.
    Retryable,
    /// Other 4xx, malformed response — retrying cannot help.
    Fatal,
}

/// One failed attempt, as reported by the request function.
#[derive(Debug, Clone)]
pub struct TransportFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TransportFailure {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Retryable,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::Retryable => write!(f, "retryable: {}", self.message),
            FailureKind::Fatal => write!(f, "fatal: {}", self.message),
        }
    }
}

/// Terminal transport failure. Carries the last underlying cause and the
/// number of attempts made — never silently swallowed by callers.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("gave up after {attempts} attempts, last failure: {last}")]
    Exhausted { attempts: u32, last: TransportFailure },

    #[error("fatal failure on attempt {attempts}: {last}")]
    Fatal { attempts: u32, last: TransportFailure },
}

/// Executes `op` under `policy`.
///
/// Each attempt is wrapped in the per-attempt timeout (a timeout counts as a
/// retryable failure). A `Fatal` classification short-circuits remaining
/// retries. Emits one structured log line per attempt.
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, TransportError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TransportFailure>>,
{
    let mut attempt: u32 = 1;
    let mut delay_spent = Duration::ZERO;

    loop {
        let started = tokio::time::Instant::now();
        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(TransportFailure::retryable(format!(
                "attempt timed out after {:?}",
                policy.attempt_timeout
            ))),
        };
        let latency = started.elapsed();

        let failure = match outcome {
            Ok(value) => {
                debug!(label, attempt, latency_ms = latency.as_millis() as u64, "call succeeded");
                return Ok(value);
            }
            Err(failure) => failure,
        };

        warn!(
            label,
            attempt,
            latency_ms = latency.as_millis() as u64,
            kind = ?failure.kind,
            "call failed: {}",
            failure.message
        );

        if failure.kind == FailureKind::Fatal {
            return Err(TransportError::Fatal {
                attempts: attempt,
                last: failure,
            });
        }

        if attempt >= policy.max_attempts {
            return Err(TransportError::Exhausted {
                attempts: attempt,
                last: failure,
            });
        }

        let delay = backoff_delay(policy, attempt);
        if delay_spent + delay > policy.max_total_delay {
            warn!(label, attempt, "backoff budget exhausted");
            return Err(TransportError::Exhausted {
                attempts: attempt,
                last: failure,
            });
        }
        delay_spent += delay;

        debug!(label, attempt, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Exponential backoff with multiplicative jitter.
fn backoff_delay(policy: &RetryPolicy, failed_attempts: u32) -> Duration {
    let exp = policy.base_backoff.as_secs_f64()
        * policy.multiplier.powi(failed_attempts.saturating_sub(1) as i32);
    let factor = if policy.jitter > 0.0 {
        rand::thread_rng().gen_range(1.0 - policy.jitter..=1.0 + policy.jitter)
    } else {
        1.0
    };
    Duration::from_secs_f64((exp * factor).max(0.0))
}

/// HTTP status classification shared by the crawler and reasoning clients:
/// 429 and 5xx are retryable, every other non-success status is fatal.
pub fn classify_status(status: reqwest::StatusCode) -> FailureKind {
    if status.as_u16() == 429 || status.is_server_error() {
        FailureKind::Retryable
    } else {
        FailureKind::Fatal
    }
}

/// Builds a failure from a non-success HTTP status plus a body snippet.
pub fn failure_from_status(status: reqwest::StatusCode, body: &str) -> TransportFailure {
    let snippet: String = body.chars().take(200).collect();
    TransportFailure {
        kind: classify_status(status),
        message: format!("HTTP {status}: {snippet}"),
    }
}

/// Classifies a reqwest error: timeouts and connection failures are
/// retryable, request construction and body decode problems are fatal.
pub fn failure_from_request(err: &reqwest::Error) -> TransportFailure {
    if err.is_timeout() || err.is_connect() {
        TransportFailure::retryable(format!("network error: {err}"))
    } else if err.is_builder() || err.is_decode() {
        TransportFailure::fatal(format!("malformed request/response: {err}"))
    } else {
        // Connection resets and other mid-flight request errors.
        TransportFailure::retryable(format!("request error: {err}"))
    }
}
