//! Backoff for transient chat-completion failures.

use std::future::Future;
use std::time::{Duration, SystemTime};

/// Why a request is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    Connect,
    Timeout,
    RateLimited,
    ServerError,
    RequestTimeout,
}

impl RetryReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::RequestTimeout => "request_timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        reason: RetryReason,
        retry_after: Option<Duration>,
    },
    DoNotRetry,
}

/// One scheduled retry, reported to the caller before sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    pub attempt: u32,
    pub delay: Duration,
    pub reason: RetryReason,
}

/// Exponential backoff with symmetric jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts including the first request.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 0.0..=1.0
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            jitter_ratio: 0.20,
        }
    }
}

impl RetryPolicy {
    /// No retries at all; used by tests and for non-idempotent calls.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_ratio: 0.0,
        }
    }

    /// Delay before retry number `retry_index` (1-based), capped at `max_delay`.
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let shift = retry_index.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn with_jitter(&self, delay: Duration) -> Duration {
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let millis = delay.as_millis() as f64;
        let spread = millis * self.jitter_ratio.clamp(0.0, 1.0);
        let low = (millis - spread).max(0.0);
        let high = millis + spread;
        if high <= low {
            return Duration::from_millis(low.round() as u64);
        }
        let sampled = rand::random::<f64>() * (high - low) + low;
        Duration::from_millis(sampled.round() as u64)
    }
}

/// Parse a `Retry-After` header given either as seconds or as an HTTP date.
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    let raw = headers.get(reqwest::header::RETRY_AFTER)?.to_str().ok()?.trim();

    if let Ok(secs) = raw.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let when = httpdate::parse_http_date(raw).ok()?;
    Some(when.duration_since(SystemTime::now()).unwrap_or(Duration::ZERO))
}

/// Decide whether a chat-completion send result is transient.
pub fn classify_send_result(
    result: &Result<reqwest::Response, reqwest::Error>,
) -> RetryDecision {
    match result {
        Ok(resp) => {
            let status = resp.status();
            let reason = if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                RetryReason::RateLimited
            } else if status == reqwest::StatusCode::REQUEST_TIMEOUT {
                RetryReason::RequestTimeout
            } else if status.is_server_error() {
                RetryReason::ServerError
            } else {
                return RetryDecision::DoNotRetry;
            };
            RetryDecision::Retry {
                reason,
                retry_after: parse_retry_after(resp.headers()),
            }
        }
        Err(err) if err.is_timeout() => RetryDecision::Retry {
            reason: RetryReason::Timeout,
            retry_after: None,
        },
        Err(err) if err.is_connect() || err.is_request() => RetryDecision::Retry {
            reason: RetryReason::Connect,
            retry_after: None,
        },
        Err(_) => RetryDecision::DoNotRetry,
    }
}

/// Run `operation` until it succeeds, `classify` says stop, or the policy's
/// attempts are used up. The last result is returned as-is.
pub async fn retry_with_backoff<T, E, Op, Fut, Classify, OnRetry>(
    policy: &RetryPolicy,
    mut operation: Op,
    mut classify: Classify,
    mut on_retry: OnRetry,
) -> Result<T, E>
where
    Op: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    Classify: FnMut(&Result<T, E>) -> RetryDecision,
    OnRetry: FnMut(RetryAttempt),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = operation(attempt).await;
        if attempt >= max_attempts {
            return result;
        }

        match classify(&result) {
            RetryDecision::Retry {
                reason,
                retry_after,
            } => {
                let delay =
                    policy.with_jitter(retry_after.unwrap_or_else(|| policy.backoff_delay(attempt)));
                on_retry(RetryAttempt {
                    attempt,
                    delay,
                    reason,
                });
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            RetryDecision::DoNotRetry => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn instant_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_ratio: 0.0,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            jitter_ratio: 0.0,
        };
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.with_jitter(Duration::from_millis(1000));
            assert!(d >= Duration::from_millis(800) && d <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_parse_retry_after_past_date_is_zero() {
        let mut headers = HeaderMap::new();
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let mut reported = Vec::new();

        let result = retry_with_backoff(
            &instant_policy(3),
            move |_attempt| {
                let seen = seen.clone();
                async move {
                    if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("transient")
                    } else {
                        Ok("ok")
                    }
                }
            },
            |r: &Result<&str, &str>| match r {
                Err(_) => RetryDecision::Retry {
                    reason: RetryReason::Connect,
                    retry_after: None,
                },
                Ok(_) => RetryDecision::DoNotRetry,
            },
            |info| reported.push(info.attempt),
        )
        .await;

        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(reported, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();

        let result: Result<(), &str> = retry_with_backoff(
            &instant_policy(2),
            move |_| {
                let seen = seen.clone();
                async move {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Err("still down")
                }
            },
            |_| RetryDecision::Retry {
                reason: RetryReason::ServerError,
                retry_after: None,
            },
            |_| {},
        )
        .await;

        assert_eq!(result, Err("still down"));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
