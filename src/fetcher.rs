//! HTTP fetching with timeouts, retry/backoff, and a per-source concurrency limit.
//!
//! # Retry Strategy
//!
//! - Only HTTP 429 and timeouts (client-side or HTTP 408) are retried
//! - Exponential backoff starting at `backoff_base`, doubling per attempt
//! - Delay capped at `max_delay`, plus random jitter in `[0, jitter]`
//! - After `max_retries` retries the last error is wrapped in
//!   [`FetchError::RetriesExhausted`]
//!
//! # Concurrency
//!
//! Each [`Fetcher`] carries a [`Limiter`]. A permit is held for the whole
//! fetch, backoff sleeps included, so a struggling site never sees more than
//! `limit` requests in flight from us.

use crate::error::FetchError;
use crate::models::FetchResult;
use crate::utils::truncate_for_log;
use rand::{Rng, rng};
use reqwest::{Client, StatusCode, header};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125 Safari/537.36";
const FEED_USER_AGENT: &str = concat!(
    "crypto_news_scraper/",
    env!("CARGO_PKG_VERSION"),
    " Mozilla/5.0 Chrome/125"
);
const FEED_ACCEPT: &str = "application/rss+xml,text/xml,application/xml,text/html;q=0.9";

/// What is being fetched; selects headers and timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// RSS/Atom feed; slow endpoint timeout.
    Feed,
    /// Listing or article HTML page; page timeout.
    Html,
}

impl FetchKind {
    pub fn user_agent(&self) -> &'static str {
        match self {
            FetchKind::Feed => FEED_USER_AGENT,
            FetchKind::Html => BROWSER_USER_AGENT,
        }
    }

    pub fn accept(&self) -> &'static str {
        match self {
            FetchKind::Feed => FEED_ACCEPT,
            FetchKind::Html => "text/html",
        }
    }
}

/// Retry schedule applied by the [`Fetcher`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry` (1-based), without jitter.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.backoff_base.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails with a non-retriable error,
    /// or runs out of retries.
    pub async fn run<T, F, Fut>(&self, url: &str, mut operation: F) -> Result<FetchResult<T>, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let total_t0 = Instant::now();
        let mut retries = 0u32;

        loop {
            let attempt_t0 = Instant::now();
            match operation().await {
                Ok(value) => {
                    return Ok(FetchResult {
                        value,
                        retry_count: retries,
                    });
                }
                Err(e) if !e.is_retriable() => return Err(e),
                Err(e) => {
                    if retries >= self.max_retries {
                        error!(
                            url,
                            retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(FetchError::RetriesExhausted {
                            url: url.to_string(),
                            retries,
                            last: Box::new(e),
                        });
                    }
                    retries += 1;

                    let mut delay = self.delay_for(retries);
                    let jitter_ms = self.jitter.as_millis() as u64;
                    if jitter_ms > 0 {
                        delay += Duration::from_millis(rng().random_range(0..=jitter_ms));
                    }
                    warn!(
                        url,
                        attempt = retries,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "fetch attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Counting semaphore bounding in-flight requests against one source.
#[derive(Debug, Clone)]
pub struct Limiter {
    permits: Arc<Semaphore>,
    limit: usize,
}

impl Limiter {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

/// A body fetched successfully, with the retries it took.
pub type Fetched = FetchResult<String>;

/// Per-source HTTP fetcher. Cheap to clone; clones share client and limiter.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    limiter: Limiter,
    page_timeout: Duration,
    slow_timeout: Duration,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, limiter: Limiter) -> Self {
        Self {
            client,
            policy,
            limiter,
            page_timeout: Duration::from_secs(15),
            slow_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(mut self, page_timeout: Duration, slow_timeout: Duration) -> Self {
        self.page_timeout = page_timeout;
        self.slow_timeout = slow_timeout;
        self
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    pub fn timeout_for(&self, kind: FetchKind) -> Duration {
        match kind {
            FetchKind::Feed => self.slow_timeout,
            FetchKind::Html => self.page_timeout,
        }
    }

    /// Fetch `url` and return its body.
    ///
    /// Waits for a limiter slot first, then retries per the [`RetryPolicy`].
    #[instrument(level = "debug", skip_all, fields(%url, ?kind))]
    pub async fn fetch(&self, url: &str, kind: FetchKind) -> Result<Fetched, FetchError> {
        let _permit = self
            .limiter
            .permits
            .acquire()
            .await
            .map_err(|_| FetchError::LimiterClosed)?;

        let t0 = Instant::now();
        let res = self.policy.run(url, || self.attempt(url, kind)).await;
        match &res {
            Ok(fetched) => debug!(
                bytes = fetched.value.len(),
                retries = fetched.retry_count,
                elapsed_ms = t0.elapsed().as_millis(),
                "fetched"
            ),
            Err(e) => debug!(error = %e, elapsed_ms = t0.elapsed().as_millis(), "fetch failed"),
        }
        res
    }

    async fn attempt(&self, url: &str, kind: FetchKind) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout_for(kind))
            .header(header::USER_AGENT, kind.user_agent())
            .header(header::ACCEPT, kind.accept())
            .send()
            .await
            .map_err(|e| classify(url, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited {
                url: url.to_string(),
            });
        }
        if status == StatusCode::REQUEST_TIMEOUT {
            return Err(FetchError::Timeout {
                url: url.to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(status = status.as_u16(), body = %truncate_for_log(&body, 200), "unexpected status");
            return Err(FetchError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response.text().await.map_err(|e| classify(url, e))
    }
}

fn classify(url: &str, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Http(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn quick_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            backoff_base: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    fn rate_limited() -> FetchError {
        FetchError::RateLimited {
            url: "https://test.example.com".to_owned(),
        }
    }

    #[test]
    fn backoff_doubles_from_base_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            backoff_base: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::ZERO,
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(6), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn succeeds_immediately_on_first_try() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, FetchError>(42)
            })
            .await
            .unwrap();
        assert_eq!(result.value, 42);
        assert_eq!(result.retry_count, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_on_rate_limit_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("u", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(rate_limited())
                } else {
                    Ok(99)
                }
            })
            .await
            .unwrap();
        assert_eq!(result.value, 99);
        assert_eq!(result.retry_count, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_retries_returns_typed_failure() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(FetchError::Timeout { url: "u".to_owned() })
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match result {
            Err(FetchError::RetriesExhausted { retries, last, .. }) => {
                assert_eq!(retries, 3);
                assert!(matches!(*last, FetchError::Timeout { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn does_not_retry_unexpected_status() {
        let calls = AtomicU32::new(0);
        let result = quick_policy(3)
            .run("u", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(FetchError::UnexpectedStatus {
                    status: 500,
                    url: "u".to_owned(),
                })
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::UnexpectedStatus { status: 500, .. })));
    }

    #[test]
    fn kinds_use_distinct_headers() {
        assert_eq!(FetchKind::Html.accept(), "text/html");
        assert!(FetchKind::Feed.accept().contains("application/rss+xml"));
        assert_ne!(FetchKind::Feed.user_agent(), FetchKind::Html.user_agent());
    }

    #[test]
    fn feed_uses_slow_timeout() {
        let fetcher = Fetcher::new(Client::new(), RetryPolicy::default(), Limiter::new(2))
            .with_timeouts(Duration::from_secs(15), Duration::from_secs(45));
        assert_eq!(fetcher.timeout_for(FetchKind::Html), Duration::from_secs(15));
        assert_eq!(fetcher.timeout_for(FetchKind::Feed), Duration::from_secs(45));
    }

    #[test]
    fn limiter_is_at_least_one() {
        let limiter = Limiter::new(0);
        assert_eq!(limiter.limit(), 1);
        assert_eq!(limiter.available(), 1);
    }

    fn quick_fetcher(max_retries: u32, page_timeout: Duration) -> Fetcher {
        let policy = RetryPolicy {
            backoff_base: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            ..quick_policy(max_retries)
        };
        Fetcher::new(Client::new(), policy, Limiter::new(1))
            .with_timeouts(page_timeout, page_timeout)
    }

    #[tokio::test]
    async fn client_timeout_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .expect(3)
            .mount(&server)
            .await;

        let url = format!("{}/slow", server.uri());
        let result = quick_fetcher(2, Duration::from_millis(100))
            .fetch(&url, FetchKind::Html)
            .await;
        match result {
            Err(FetchError::RetriesExhausted { retries, last, .. }) => {
                assert_eq!(retries, 2);
                assert!(matches!(*last, FetchError::Timeout { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_408_is_retried_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(408))
            .expect(3)
            .mount(&server)
            .await;

        let url = format!("{}/busy", server.uri());
        let result = quick_fetcher(2, Duration::from_secs(5))
            .fetch(&url, FetchKind::Feed)
            .await;
        match result {
            Err(FetchError::RetriesExhausted { retries, last, .. }) => {
                assert_eq!(retries, 2);
                assert!(matches!(*last, FetchError::Timeout { .. }));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn http_500_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let url = format!("{}/broken", server.uri());
        let result = quick_fetcher(2, Duration::from_secs(5))
            .fetch(&url, FetchKind::Html)
            .await;
        assert!(matches!(result, Err(FetchError::UnexpectedStatus { status: 500, .. })));
    }
}
