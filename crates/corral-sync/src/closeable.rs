// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::{AcquireError, AlreadyClosed};
use crate::metrics::{NoopMetrics, SemaphoreMetrics};

/// An acquired slot on a [`CloseableSemaphore`]. Releases automatically on
/// drop.
pub type Permit<'a> = SemaphorePermit<'a>;

/// A counting semaphore that can be permanently closed.
///
/// Closing coordinates with in-flight and future acquire attempts through
/// `tokio::sync::Semaphore`'s own closed state: once `close` returns, no
/// acquire call — including one that was already parked waiting for a slot
/// — can go on to report success. Every acquire variant reports
/// [`AcquireError::Closed`] once closed.
pub struct CloseableSemaphore {
    inner: Semaphore,
    closed_signal: CancellationToken,
    closed_once: AtomicBool,
    metrics: Arc<dyn SemaphoreMetrics>,
}

impl CloseableSemaphore {
    /// Creates a closeable semaphore with `capacity` slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, Arc::new(NoopMetrics))
    }

    /// Creates a closeable semaphore decorated with a metrics sink.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_metrics(capacity: usize, metrics: Arc<dyn SemaphoreMetrics>) -> Self {
        assert!(capacity >= 1, "semaphore capacity must be >= 1");
        Self {
            inner: Semaphore::new(capacity),
            closed_signal: CancellationToken::new(),
            closed_once: AtomicBool::new(false),
            metrics,
        }
    }

    /// Blocks until a slot is free, or fails with `Closed` once the
    /// semaphore has been closed.
    pub async fn acquire(&self) -> Result<Permit<'_>, AcquireError> {
        self.record(self.inner.acquire().await)
    }

    /// Blocks until a slot is free, `timeout` elapses, or the semaphore is
    /// closed.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>, AcquireError> {
        match tokio::time::timeout(timeout, self.inner.acquire()).await {
            Ok(result) => self.record(result),
            Err(_elapsed) => {
                self.metrics.failed();
                Err(AcquireError::Timeout)
            }
        }
    }

    /// Blocks until a slot is free, `token` is cancelled, or the semaphore
    /// is closed.
    pub async fn acquire_ctx(&self, token: &CancellationToken) -> Result<Permit<'_>, AcquireError> {
        tokio::select! {
            result = self.inner.acquire() => self.record(result),
            () = token.cancelled() => {
                self.metrics.failed();
                Err(AcquireError::Cancelled)
            }
        }
    }

    /// Attempts to acquire a slot without blocking. Returns `None` both when
    /// the semaphore is momentarily exhausted and when it has been closed.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        match self.inner.try_acquire() {
            Ok(permit) => {
                self.metrics.acquired();
                Some(permit)
            }
            Err(TryAcquireError::NoPermits | TryAcquireError::Closed) => {
                self.metrics.failed();
                None
            }
        }
    }

    /// Permanently closes the semaphore.
    ///
    /// Idempotent: the first call closes the semaphore and returns `Ok(())`;
    /// every subsequent call returns `Err(AlreadyClosed)`.
    pub fn close(&self) -> Result<(), AlreadyClosed> {
        if self.closed_once.swap(true, Ordering::AcqRel) {
            return Err(AlreadyClosed);
        }
        self.inner.close();
        self.closed_signal.cancel();
        Ok(())
    }

    /// `true` once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves once the semaphore has been closed.
    pub async fn closed(&self) {
        self.closed_signal.cancelled().await
    }

    fn record<'a>(
        &self,
        result: Result<Permit<'a>, tokio::sync::AcquireError>,
    ) -> Result<Permit<'a>, AcquireError> {
        match result {
            Ok(permit) => {
                self.metrics.acquired();
                Ok(permit)
            }
            Err(_closed) => {
                self.metrics.failed();
                Err(AcquireError::Closed)
            }
        }
    }
}

/// Capacity-1 sugar over [`CloseableSemaphore`].
pub struct CloseableBinarySemaphore(CloseableSemaphore);

impl CloseableBinarySemaphore {
    /// Creates a new closeable binary semaphore (an unlocked, closeable
    /// mutex).
    pub fn new() -> Self {
        Self(CloseableSemaphore::new(1))
    }

    /// Blocks until the lock is free or the semaphore is closed.
    pub async fn acquire(&self) -> Result<Permit<'_>, AcquireError> {
        self.0.acquire().await
    }

    /// Permanently closes the semaphore; idempotent, see
    /// [`CloseableSemaphore::close`].
    pub fn close(&self) -> Result<(), AlreadyClosed> {
        self.0.close()
    }

    /// Resolves once the semaphore has been closed.
    pub async fn closed(&self) {
        self.0.closed().await
    }
}

impl Default for CloseableBinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}
