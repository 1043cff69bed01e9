// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::rewind::RewindableRequest;

/// Narrow metrics sink a [`RetryTransactor`] can be decorated with.
///
/// Mirrors `corral_sync::SemaphoreMetrics`: decoration never changes retry
/// semantics, it only observes them.
pub trait RetryMetrics: Send + Sync {
    /// Called once per additional attempt made after the first.
    fn retried(&self) {}
}

/// A [`RetryMetrics`] that records nothing; the default for undecorated
/// transactors.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRetryMetrics;

impl RetryMetrics for NoopRetryMetrics {}

/// A classification of failure a [`RetryTransactor`] can reason about.
///
/// Parameterizing the transactor over this trait rather than hardcoding
/// `reqwest::Error` keeps the retry-count contract unit-testable: tests can
/// hand back a fake error that reports itself as temporary without
/// fabricating a real network failure.
pub trait RetryableError {
    /// Whether this failure is worth retrying.
    fn is_temporary(&self) -> bool;
}

impl RetryableError for reqwest::Error {
    fn is_temporary(&self) -> bool {
        self.is_timeout() || self.is_connect() || self.is_request()
    }
}

/// Decides the delay before the next attempt. `attempt` is 1 for the delay
/// before the second attempt, 2 before the third, and so on.
pub trait SleepStrategy: Send + Sync {
    /// Computes the delay before the given retry attempt.
    fn delay(&self, attempt: u32, interval: Duration) -> Duration;
}

/// Retries after a fixed `interval`, regardless of attempt number.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff;

impl SleepStrategy for ConstantBackoff {
    fn delay(&self, _attempt: u32, interval: Duration) -> Duration {
        interval
    }
}

/// Doubles the delay on each attempt: `interval * 2^(attempt - 1)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff;

impl SleepStrategy for ExponentialBackoff {
    fn delay(&self, attempt: u32, interval: Duration) -> Duration {
        interval.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Which response status codes should be treated as retryable failures.
#[derive(Debug, Clone)]
pub struct RetryCodes(Vec<StatusCode>);

impl RetryCodes {
    /// The codes the rate-limited drainer's downstream calls retry on by
    /// default: request timeout, too many requests, and gateway timeout.
    pub fn default_codes() -> Self {
        Self(vec![
            StatusCode::REQUEST_TIMEOUT,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::GATEWAY_TIMEOUT,
        ])
    }

    /// Builds a custom set of retryable status codes.
    pub fn new(codes: Vec<StatusCode>) -> Self {
        Self(codes)
    }

    fn contains(&self, status: StatusCode) -> bool {
        self.0.contains(&status)
    }
}

/// Configuration for a [`RetryTransactor`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of retry attempts after the first. Zero means the request is
    /// sent exactly once and never retried.
    pub retries: u32,
    /// Base interval handed to the [`SleepStrategy`].
    pub interval: Duration,
    /// Status codes treated as retryable responses.
    pub retry_codes: RetryCodes,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 0,
            interval: Duration::from_millis(100),
            retry_codes: RetryCodes::default_codes(),
        }
    }
}

/// Failure returned once a [`RetryTransactor`] gives up.
#[derive(Debug)]
pub enum TransactorError<E> {
    /// The request body could not be captured for replay on a later
    /// attempt.
    NotRewindable,
    /// Every attempt, including retries, failed with a transport error.
    Transport(E),
}

type RequestMutator = Box<dyn Fn(&mut reqwest::Request) + Send + Sync>;

/// Sends a request, retrying on transport errors and configured response
/// status codes up to `policy.retries` additional times.
///
/// With `retries == 0` the transactor is a pass-through: it sends the
/// request once and returns whatever happens, without capturing the body
/// for replay at all.
pub struct RetryTransactor {
    client: Client,
    policy: RetryPolicy,
    sleep_strategy: Box<dyn SleepStrategy>,
    should_retry_error: Box<dyn Fn(&reqwest::Error) -> bool + Send + Sync>,
    request_mutator: Option<RequestMutator>,
    metrics: Arc<dyn RetryMetrics>,
}

impl RetryTransactor {
    /// Builds a transactor around a `reqwest::Client` with a constant
    /// backoff between attempts.
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self::with_sleep_strategy(client, policy, Box::new(ConstantBackoff))
    }

    /// Builds a transactor with a custom [`SleepStrategy`].
    pub fn with_sleep_strategy(
        client: Client,
        policy: RetryPolicy,
        sleep_strategy: Box<dyn SleepStrategy>,
    ) -> Self {
        Self {
            client,
            policy,
            sleep_strategy,
            should_retry_error: Box::new(<reqwest::Error as RetryableError>::is_temporary),
            request_mutator: None,
            metrics: Arc::new(NoopRetryMetrics),
        }
    }

    /// Overrides the transport-error predicate used to decide whether a
    /// failed attempt is retryable. Defaults to
    /// [`RetryableError::is_temporary`] for `reqwest::Error`.
    #[must_use]
    pub fn with_should_retry_error(
        mut self,
        predicate: impl Fn(&reqwest::Error) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_retry_error = Box::new(predicate);
        self
    }

    /// Installs a hook invoked on the rewound request between attempts,
    /// before it is resent — e.g. to refresh a bearer token or add a
    /// `Retry-Count` header. Never invoked before the first attempt.
    #[must_use]
    pub fn with_request_mutator(
        mut self,
        mutator: impl Fn(&mut reqwest::Request) + Send + Sync + 'static,
    ) -> Self {
        self.request_mutator = Some(Box::new(mutator));
        self
    }

    /// Decorates the transactor with a [`RetryMetrics`] sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn RetryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Executes `request`, retrying according to the configured policy.
    pub async fn execute(
        &self,
        request: reqwest::Request,
    ) -> Result<Response, TransactorError<reqwest::Error>> {
        if self.policy.retries == 0 {
            return self
                .client
                .execute(request)
                .await
                .map_err(TransactorError::Transport);
        }

        let rewindable =
            RewindableRequest::capture(&request).map_err(|_| TransactorError::NotRewindable)?;

        let mut attempt = 0u32;
        loop {
            let mut next_request = rewindable.rewind();
            if attempt > 0 {
                if let Some(mutator) = &self.request_mutator {
                    mutator(&mut next_request);
                }
            }

            let outcome = self.client.execute(next_request).await;
            let retryable = match &outcome {
                Ok(response) => self.policy.retry_codes.contains(response.status()),
                Err(error) => (self.should_retry_error)(error),
            };

            if !should_retry(retryable, attempt, self.policy.retries) {
                return outcome.map_err(TransactorError::Transport);
            }

            self.metrics.retried();
            attempt += 1;
            let delay = self.sleep_strategy.delay(attempt, self.policy.interval);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying request");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Whether another attempt should be made, given the outcome of the last one
/// and how many attempts have already been retried.
///
/// Pulled out as a pure function so the exact retry-count contract can be
/// checked without a real transport.
fn should_retry(last_outcome_was_retryable: bool, attempt: u32, max_retries: u32) -> bool {
    last_outcome_was_retryable && attempt < max_retries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::http::HeaderMap;
    use axum::routing::{get, post};
    use axum::Router;
    use tokio::net::TcpListener;

    struct CountingMetrics(AtomicUsize);

    impl RetryMetrics for CountingMetrics {
        fn retried(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn retry_counter_increments_once_per_retry() {
        let router = Router::new().route("/", get(|| async { StatusCode::TOO_MANY_REQUESTS }));
        let base = spawn(router).await;

        let metrics = Arc::new(CountingMetrics(AtomicUsize::new(0)));
        let transactor = RetryTransactor::new(
            Client::new(),
            RetryPolicy {
                retries: 2,
                interval: Duration::from_millis(1),
                retry_codes: RetryCodes::default_codes(),
            },
        )
        .with_metrics(Arc::clone(&metrics) as Arc<dyn RetryMetrics>);

        let request = Client::new().get(&base).build().unwrap();
        let response = transactor.execute(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(metrics.0.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn request_mutator_runs_only_between_attempts() {
        async fn handle(headers: HeaderMap) -> StatusCode {
            match headers.get("x-attempt") {
                Some(value) if value == "1" => StatusCode::OK,
                _ => StatusCode::TOO_MANY_REQUESTS,
            }
        }
        let router = Router::new().route("/", post(handle));
        let base = spawn(router).await;

        let calls = Arc::new(AtomicUsize::new(0));
        let mutator_calls = Arc::clone(&calls);
        let transactor = RetryTransactor::new(
            Client::new(),
            RetryPolicy {
                retries: 1,
                interval: Duration::from_millis(1),
                retry_codes: RetryCodes::default_codes(),
            },
        )
        .with_request_mutator(move |request| {
            mutator_calls.fetch_add(1, Ordering::Relaxed);
            request
                .headers_mut()
                .insert("x-attempt", "1".parse().unwrap());
        });

        let request = Client::new().post(&base).build().unwrap();
        let response = transactor.execute(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn custom_error_predicate_suppresses_retry_on_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let base = format!("http://{addr}");

        let metrics = Arc::new(CountingMetrics(AtomicUsize::new(0)));
        let transactor = RetryTransactor::new(
            Client::new(),
            RetryPolicy {
                retries: 3,
                interval: Duration::from_millis(1),
                retry_codes: RetryCodes::default_codes(),
            },
        )
        .with_should_retry_error(|_| false)
        .with_metrics(Arc::clone(&metrics) as Arc<dyn RetryMetrics>);

        let request = Client::new().get(&base).build().unwrap();
        let result = transactor.execute(request).await;
        assert!(matches!(result, Err(TransactorError::Transport(_))));
        assert_eq!(metrics.0.load(Ordering::Relaxed), 0);
    }

    struct FlakyError(bool);

    impl RetryableError for FlakyError {
        fn is_temporary(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn exponential_backoff_doubles_each_attempt() {
        let backoff = ExponentialBackoff;
        let base = Duration::from_millis(10);
        assert_eq!(backoff.delay(1, base), Duration::from_millis(10));
        assert_eq!(backoff.delay(2, base), Duration::from_millis(20));
        assert_eq!(backoff.delay(3, base), Duration::from_millis(40));
    }

    #[test]
    fn constant_backoff_never_changes() {
        let backoff = ConstantBackoff;
        let base = Duration::from_millis(15);
        assert_eq!(backoff.delay(1, base), base);
        assert_eq!(backoff.delay(9, base), base);
    }

    #[test]
    fn retry_codes_default_set_contains_429() {
        let codes = RetryCodes::default_codes();
        assert!(codes.contains(StatusCode::TOO_MANY_REQUESTS));
        assert!(!codes.contains(StatusCode::OK));
    }

    #[test]
    fn retries_exactly_n_times_on_persistent_temporary_error() {
        let retries = 3u32;
        let mut attempts = 1u32;
        let mut attempt = 0u32;
        let error = FlakyError(true);
        while should_retry(error.is_temporary(), attempt, retries) {
            attempt += 1;
            attempts += 1;
        }
        assert_eq!(attempts, retries + 1);
    }

    #[test]
    fn zero_retries_sends_exactly_once() {
        assert!(!should_retry(true, 0, 0));
    }

    #[test]
    fn permanent_error_never_retries() {
        let error = FlakyError(false);
        assert!(!should_retry(error.is_temporary(), 0, 5));
    }

    #[test]
    fn stops_once_attempt_reaches_max_retries() {
        assert!(should_retry(true, 2, 3));
        assert!(!should_retry(true, 3, 3));
    }
}
