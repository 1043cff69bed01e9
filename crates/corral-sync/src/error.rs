// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure modes for a semaphore acquire attempt.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireError {
    /// The semaphore has been closed; no further acquisitions will succeed.
    #[error("semaphore is closed")]
    Closed,
    /// The caller-supplied deadline elapsed before a slot became free.
    #[error("acquire timed out")]
    Timeout,
    /// The caller-supplied cancellation token fired before a slot became free.
    #[error("acquire was cancelled")]
    Cancelled,
}

/// Failure mode for a `Close` call on an already-closed semaphore.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("semaphore is already closed")]
pub struct AlreadyClosed;
