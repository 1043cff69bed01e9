// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

/// Narrow metrics sink a semaphore can be decorated with.
///
/// Implementations back a counter (resources currently held) and a gauge or
/// counter for failed acquisitions. Decoration never changes acquire/release
/// semantics; it only observes them.
pub trait SemaphoreMetrics: Send + Sync {
    /// Called once a slot has been successfully acquired.
    fn acquired(&self) {}
    /// Called once a held slot has been released.
    fn released(&self) {}
    /// Called when an acquire attempt ends in `AcquireError`.
    fn failed(&self) {}
}

/// A `SemaphoreMetrics` that records nothing; the default for undecorated
/// semaphores.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl SemaphoreMetrics for NoopMetrics {}
