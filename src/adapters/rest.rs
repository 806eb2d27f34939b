//! Shared REST plumbing for venue adapters.
//!
//! Every adapter call goes through [`RestClient::get_json`], which
//! acquires the caller's rate-limit key before each attempt and applies
//! the retry policy: exponential backoff with jitter, capped at 30s,
//! retrying only transient failures. A 429 honors the server's
//! `Retry-After` before the next attempt.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::rate_limit::RateLimiter;

const BACKOFF_CAP: Duration = Duration::from_secs(30);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Retry configuration shared by all adapters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// `base * 2^attempt + random(0,1)s`, capped at 30s.
    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay
            .saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let jitter = Duration::from_secs_f64(rand::random::<f64>());
        (exp + jitter).min(BACKOFF_CAP)
    }
}

/// One HTTP session per adapter, reused across calls.
pub struct RestClient {
    http: reqwest::Client,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RestClient {
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("reqwest client construction cannot fail with static config");
        Self {
            http,
            limiter,
            policy,
        }
    }

    pub fn limiter(&self) -> Arc<RateLimiter> {
        self.limiter.clone()
    }

    /// GET `url` and decode the JSON body.
    ///
    /// Returns `Ok(None)` for definitive "no data" (non-retryable 4xx),
    /// `Err` only after retries are exhausted.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        rate_key: &str,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> ExchangeResult<Option<T>> {
        let mut last_error: Option<ExchangeError> = None;

        for attempt in 0..=self.policy.max_retries {
            if attempt > 0 {
                let delay = match &last_error {
                    Some(ExchangeError::RateLimited {
                        retry_after_secs: Some(secs),
                    }) => Duration::from_secs(*secs),
                    _ => self.policy.backoff(attempt - 1),
                };
                debug!(url, attempt, delay_ms = delay.as_millis() as u64, "retrying request");
                tokio::time::sleep(delay).await;
            }

            self.limiter.acquire(rate_key, 1).await;

            match self.attempt::<T>(url, query, headers.clone()).await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_transient() => {
                    warn!(url, attempt, error = %err, "transient request failure");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ExchangeError::ConnectionFailed("retries exhausted without an error".into())
        }))
    }

    async fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> ExchangeResult<Option<T>> {
        let response = self
            .http
            .get(url)
            .query(query)
            .headers(headers)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(ExchangeError::RateLimited { retry_after_secs });
        }
        if status.is_server_error() {
            return Err(ExchangeError::ServerError(status.as_u16()));
        }
        if !status.is_success() {
            // 4xx other than 429: the venue has no data for this request.
            return Ok(None);
        }

        let body = response.json::<T>().await?;
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn client() -> RestClient {
        RestClient::new(
            Arc::new(RateLimiter::new()),
            RetryPolicy {
                max_retries: 2,
                base_delay: Duration::from_millis(10),
            },
        )
    }

    #[tokio::test]
    async fn test_success_returns_parsed_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ticker")
            .with_status(200)
            .with_body(r#"{"last":"42.5"}"#)
            .create_async()
            .await;

        let body: Option<Value> = client()
            .get_json("test_market", &format!("{}/ticker", server.url()), &[], HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(body.unwrap()["last"], "42.5");
    }

    #[tokio::test]
    async fn test_not_found_is_no_data_not_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/ticker")
            .with_status(404)
            .create_async()
            .await;

        let body: Option<Value> = client()
            .get_json("test_market", &format!("{}/ticker", server.url()), &[], HeaderMap::new())
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_retries_exhausted_surfaces_last_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/ticker")
            .with_status(500)
            .expect(3) // initial attempt + 2 retries
            .create_async()
            .await;

        let result: ExchangeResult<Option<Value>> = client()
            .get_json("test_market", &format!("{}/ticker", server.url()), &[], HeaderMap::new())
            .await;
        match result {
            Err(ExchangeError::ServerError(500)) => {}
            other => panic!("expected ServerError(500), got {other:?}"),
        }
        mock.assert_async().await;
    }
}
