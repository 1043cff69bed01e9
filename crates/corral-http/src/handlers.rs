// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};

use corral_sync::CountingSemaphore;

use crate::buffered::BufferedWriter;

/// Cooperatively waits for one of `limit` concurrent slots to free up, the
/// way `AcquireCtx` does: a request that finds every slot taken waits rather
/// than failing immediately, and only turns into a `503 Service Unavailable`
/// if its own [`RequestTimeoutLayer`] deadline elapses before a slot frees.
/// With no deadline installed upstream, the wait has no bound.
#[derive(Clone)]
pub struct BusyLimiterLayer {
    semaphore: Arc<CountingSemaphore>,
}

impl BusyLimiterLayer {
    /// Admits at most `limit` concurrent requests through the wrapped
    /// service.
    pub fn new(limit: usize) -> Self {
        Self {
            semaphore: Arc::new(CountingSemaphore::new(limit)),
        }
    }
}

impl<S> Layer<S> for BusyLimiterLayer {
    type Service = BusyLimiter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BusyLimiter {
            inner,
            semaphore: Arc::clone(&self.semaphore),
        }
    }
}

/// [`Service`] installed by [`BusyLimiterLayer`].
#[derive(Clone)]
pub struct BusyLimiter<S> {
    inner: S,
    semaphore: Arc<CountingSemaphore>,
}

impl<S> Service<Request<Body>> for BusyLimiter<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let semaphore = Arc::clone(&self.semaphore);
        let mut inner = self.inner.clone();
        let deadline = request.extensions().get::<CancellationToken>().cloned();
        Box::pin(async move {
            let permit = match &deadline {
                Some(token) => semaphore.acquire_ctx(token).await,
                None => Ok(semaphore.acquire().await),
            };
            let Ok(_permit) = permit else {
                return Ok((StatusCode::SERVICE_UNAVAILABLE, "server busy").into_response());
            };
            inner.call(request).await
        })
    }
}

/// Inserts a [`CancellationToken`] into request extensions that fires once
/// `timeout` elapses. A zero-length timeout installs nothing, making this
/// layer the identity.
#[derive(Clone)]
pub struct RequestTimeoutLayer {
    timeout: Duration,
}

impl RequestTimeoutLayer {
    /// Builds the layer. `Duration::ZERO` disables it entirely.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for RequestTimeoutLayer {
    type Service = RequestTimeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestTimeout {
            inner,
            timeout: self.timeout,
        }
    }
}

/// [`Service`] installed by [`RequestTimeoutLayer`].
#[derive(Clone)]
pub struct RequestTimeout<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Request<Body>> for RequestTimeout<S>
where
    S: Service<Request<Body>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Body>) -> Self::Future {
        if !self.timeout.is_zero() {
            let token = CancellationToken::new();
            let deadline_token = token.clone();
            let timeout = self.timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                deadline_token.cancel();
            });
            request.extensions_mut().insert(token);
        }
        self.inner.call(request)
    }
}

/// Builds the default `timed_out` response for [`DeferredTimeoutLayer`]:
/// `504 Gateway Timeout` with a short plain-text body.
pub fn default_timed_out_response() -> Response {
    (StatusCode::GATEWAY_TIMEOUT, "deferred response timed out").into_response()
}

/// Runs the inner service on its own cooperative task and races it against
/// `deadline`. If the inner service wins, its response is buffered and
/// replayed; if the deadline wins, the inner task (and anything it has
/// written so far) is simply dropped and a `timed_out` response is sent
/// instead.
#[derive(Clone)]
pub struct DeferredTimeoutLayer {
    deadline: Duration,
    timed_out: Arc<dyn Fn() -> Response + Send + Sync>,
}

impl DeferredTimeoutLayer {
    /// Builds the layer with the default `504` timeout response.
    pub fn new(deadline: Duration) -> Self {
        Self::with_timed_out_response(deadline, default_timed_out_response)
    }

    /// Builds the layer with a custom response to send on timeout.
    pub fn with_timed_out_response(
        deadline: Duration,
        timed_out: impl Fn() -> Response + Send + Sync + 'static,
    ) -> Self {
        Self {
            deadline,
            timed_out: Arc::new(timed_out),
        }
    }
}

impl<S> Layer<S> for DeferredTimeoutLayer {
    type Service = DeferredTimeout<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeferredTimeout {
            inner,
            deadline: self.deadline,
            timed_out: Arc::clone(&self.timed_out),
        }
    }
}

/// [`Service`] installed by [`DeferredTimeoutLayer`].
#[derive(Clone)]
pub struct DeferredTimeout<S> {
    inner: S,
    deadline: Duration,
    timed_out: Arc<dyn Fn() -> Response + Send + Sync>,
}

impl<S> Service<Request<Body>> for DeferredTimeout<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let deadline = self.deadline;
        let timed_out = Arc::clone(&self.timed_out);
        Box::pin(async move {
            let task = tokio::spawn(async move { inner.call(request).await });

            tokio::select! {
                result = task => {
                    match result {
                        Ok(Ok(response)) => {
                            let mut buffered = BufferedWriter::from_response(response).await;
                            Ok(buffered.write_to().unwrap_or_else(|_| timed_out()))
                        }
                        Ok(Err(error)) => Err(error),
                        Err(join_error) if join_error.is_panic() => {
                            std::panic::resume_unwind(join_error.into_panic())
                        }
                        Err(_cancelled) => Ok(timed_out()),
                    }
                }
                () = tokio::time::sleep(deadline) => Ok(timed_out()),
            }
        })
    }
}
