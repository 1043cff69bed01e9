// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::AcquireError;
use crate::metrics::{NoopMetrics, SemaphoreMetrics};

/// A counting semaphore with a fixed capacity, never closeable.
///
/// `Acquire` blocks until a slot is free and never fails on its own; the
/// timed and context-scoped variants can still fail with `Timeout` or
/// `Cancelled`. Use [`CloseableSemaphore`](crate::CloseableSemaphore) when
/// the semaphore itself needs to be shut down.
pub struct CountingSemaphore {
    inner: Semaphore,
    metrics: Arc<dyn SemaphoreMetrics>,
}

/// An acquired slot. Releases automatically on drop.
pub type Permit<'a> = SemaphorePermit<'a>;

impl CountingSemaphore {
    /// Creates a semaphore with `capacity` slots.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self::with_metrics(capacity, Arc::new(NoopMetrics))
    }

    /// Creates a semaphore decorated with a metrics sink.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn with_metrics(capacity: usize, metrics: Arc<dyn SemaphoreMetrics>) -> Self {
        assert!(capacity >= 1, "semaphore capacity must be >= 1");
        Self {
            inner: Semaphore::new(capacity),
            metrics,
        }
    }

    /// Blocks until a slot is free.
    pub async fn acquire(&self) -> Permit<'_> {
        // `self.inner` is never closed, so the only error variant tokio can
        // report here is unreachable.
        let permit = self
            .inner
            .acquire()
            .await
            .expect("counting semaphore is never closed");
        self.metrics.acquired();
        permit
    }

    /// Blocks until a slot is free or `timeout` elapses.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>, AcquireError> {
        match tokio::time::timeout(timeout, self.inner.acquire()).await {
            Ok(permit) => {
                let permit = permit.expect("counting semaphore is never closed");
                self.metrics.acquired();
                Ok(permit)
            }
            Err(_elapsed) => {
                self.metrics.failed();
                Err(AcquireError::Timeout)
            }
        }
    }

    /// Blocks until a slot is free or `token` is cancelled.
    pub async fn acquire_ctx(&self, token: &CancellationToken) -> Result<Permit<'_>, AcquireError> {
        tokio::select! {
            permit = self.inner.acquire() => {
                let permit = permit.expect("counting semaphore is never closed");
                self.metrics.acquired();
                Ok(permit)
            }
            () = token.cancelled() => {
                self.metrics.failed();
                Err(AcquireError::Cancelled)
            }
        }
    }

    /// Attempts to acquire a slot without blocking.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        match self.inner.try_acquire() {
            Ok(permit) => {
                self.metrics.acquired();
                Some(permit)
            }
            Err(TryAcquireError::NoPermits) => {
                self.metrics.failed();
                None
            }
            Err(TryAcquireError::Closed) => unreachable!("counting semaphore is never closed"),
        }
    }

    /// Number of slots currently available.
    pub fn available(&self) -> usize {
        self.inner.available_permits()
    }
}

/// Capacity-1 sugar over [`CountingSemaphore`], used where the contract is
/// mutual exclusion rather than bounded concurrency.
pub struct BinarySemaphore(CountingSemaphore);

impl BinarySemaphore {
    /// Creates a new binary semaphore (an unlocked mutex).
    pub fn new() -> Self {
        Self(CountingSemaphore::new(1))
    }

    /// Blocks until the lock is free.
    pub async fn acquire(&self) -> Permit<'_> {
        self.0.acquire().await
    }

    /// Blocks until the lock is free or `timeout` elapses.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<Permit<'_>, AcquireError> {
        self.0.acquire_timeout(timeout).await
    }

    /// Blocks until the lock is free or `token` is cancelled.
    pub async fn acquire_ctx(&self, token: &CancellationToken) -> Result<Permit<'_>, AcquireError> {
        self.0.acquire_ctx(token).await
    }

    /// Attempts to acquire the lock without blocking.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        self.0.try_acquire()
    }
}

impl Default for BinarySemaphore {
    fn default() -> Self {
        Self::new()
    }
}
