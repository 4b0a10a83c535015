//! Bounded retry on HTTP 429, honouring the server's `Retry-After` hint.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};

use super::ClientError;

/// Maximum retries after the first rate-limited attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Wait used when `Retry-After` is absent or not a number of seconds.
pub const DEFAULT_FALLBACK_WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub fallback_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            fallback_wait: DEFAULT_FALLBACK_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Send the request built by `build`, retrying while the server answers 429.
    ///
    /// Any other response, success or not, is returned to the caller as is.
    /// Once `max_retries` retries have also been rate limited the call fails
    /// with [`ClientError::RateLimited`].
    pub async fn send<F>(&self, target: &str, build: F) -> Result<Response, ClientError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut retries = 0;
        loop {
            let response = build().send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            if retries >= self.max_retries {
                tracing::error!(
                    target_api = target,
                    attempts = retries + 1,
                    "Rate limit retries exhausted"
                );
                return Err(ClientError::RateLimited {
                    attempts: retries + 1,
                });
            }

            let wait = retry_after(&response).unwrap_or(self.fallback_wait);
            retries += 1;
            tracing::warn!(
                target_api = target,
                retry = retries,
                wait_secs = wait.as_secs(),
                "Rate limited, backing off"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
