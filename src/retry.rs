//! JSON-over-HTTP calls with bounded retry and exponential backoff.
//!
//! Shared by the remote embedding providers and the answer synthesizers,
//! the two network-bound boundaries of the pipeline.
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Timeouts and connection errors → retry
//! - Backoff: `base_delay × 2^(attempt-1)`, exponent capped at 5

use std::time::Duration;

use thiserror::Error;

/// Why [`post_json`] gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// The last attempt timed out.
    #[error("{0}")]
    TimedOut(String),
    /// A non-retryable response, a bad body, or retries exhausted on errors.
    #[error("{0}")]
    Failed(String),
}

/// How many times to retry and how long to wait in between.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(base_delay_ms),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.saturating_sub(1).min(5))
    }

    /// Longest a full [`post_json`] call can take when every attempt runs
    /// into the per-request `timeout`: all attempts plus every backoff sleep.
    pub fn worst_case(&self, timeout: Duration) -> Duration {
        let backoff: Duration = (1..=self.max_retries).map(|a| self.delay_for(a)).sum();
        timeout * (self.max_retries + 1) + backoff
    }
}

/// Build an HTTP client with a per-request timeout.
pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| e.to_string())
}

/// POST `body` to `url` and return the parsed JSON response.
///
/// `label` names the remote service in log lines and error messages. The
/// bearer token is sent as a header and never logged.
pub async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    policy: &RetryPolicy,
    label: &str,
) -> Result<serde_json::Value, CallError> {
    let mut last_err = None;

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| CallError::Failed(format!("{} returned invalid JSON: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(attempt, %status, "{} request failed, will retry", label);
                    last_err = Some(CallError::Failed(format!(
                        "{} API error {}: {}",
                        label, status, body_text
                    )));
                    continue;
                }

                return Err(CallError::Failed(format!(
                    "{} API error {}: {}",
                    label, status, body_text
                )));
            }
            Err(e) => {
                let kind = if e.is_timeout() { "timed out" } else { "connection error" };
                tracing::warn!(attempt, error = %e, "{} request {}, will retry", label, kind);
                let message = format!("{} request {}: {}", label, kind, e);
                last_err = Some(if e.is_timeout() {
                    CallError::TimedOut(message)
                } else {
                    CallError::Failed(message)
                });
            }
        }
    }

    Err(last_err
        .unwrap_or_else(|| CallError::Failed(format!("{} request failed after retries", label))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(8, 100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(6), Duration::from_millis(3200));
        assert_eq!(policy.delay_for(8), Duration::from_millis(3200));
    }

    #[test]
    fn worst_case_covers_every_attempt_and_sleep() {
        let policy = RetryPolicy::new(3, 100);
        // 4 attempts of 1s, then sleeps of 100 + 200 + 400 ms.
        assert_eq!(
            policy.worst_case(Duration::from_secs(1)),
            Duration::from_millis(4700)
        );
        assert_eq!(
            RetryPolicy::new(0, 100).worst_case(Duration::from_secs(2)),
            Duration::from_secs(2)
        );
    }
}
