use std::time::Duration;

use reqwest::header::{HeaderValue, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::warn;

/// Transport-level retry for Google reads: rate limits, server errors and
/// connection failures. Writes are always sent with [`RetryPolicy::none`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, initial_backoff_ms: 1_000, max_backoff_ms: 10_000 }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self { max_attempts: 1, initial_backoff_ms: 0, max_backoff_ms: 0 }
    }

    fn delay(&self, attempt: u32, retry_after: Option<&HeaderValue>) -> Duration {
        if let Some(seconds) =
            retry_after.and_then(|value| value.to_str().ok()).and_then(|v| v.parse::<u64>().ok())
        {
            return Duration::from_secs(seconds.min(30));
        }

        let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(
            self.initial_backoff_ms.saturating_mul(exponent).min(self.max_backoff_ms),
        )
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

pub(crate) async fn send_with_retry(
    request: RequestBuilder,
    policy: &RetryPolicy,
) -> Result<Response, reqwest::Error> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let Some(cloned) = request.try_clone() else {
            return request.send().await;
        };

        match cloned.send().await {
            Ok(response) if is_retryable(response.status()) && attempt < attempts => {
                let delay = policy.delay(attempt, response.headers().get(RETRY_AFTER));
                warn!(
                    event_name = "calendar.request.retry",
                    attempt,
                    status = response.status().as_u16(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying calendar request"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(error) if (error.is_timeout() || error.is_connect()) && attempt < attempts => {
                let delay = policy.delay(attempt, None);
                warn!(
                    event_name = "calendar.request.retry",
                    attempt,
                    error = %error,
                    delay_ms = delay.as_millis() as u64,
                    "retrying calendar request after transport error"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }

        attempt += 1;
    }
}
