// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Cooperative HTTP building blocks: a buffered response writer, rewindable
//! request bodies, a retrying transactor, and the handlers built on top of
//! `corral-sync`'s semaphores.

mod buffered;
mod error;
mod handlers;
mod retry;
mod rewind;

pub use buffered::BufferedWriter;
pub use error::HttpUtilError;
pub use handlers::{
    default_timed_out_response, BusyLimiter, BusyLimiterLayer, DeferredTimeout,
    DeferredTimeoutLayer, RequestTimeout, RequestTimeoutLayer,
};
pub use retry::{
    ConstantBackoff, ExponentialBackoff, NoopRetryMetrics, RetryCodes, RetryMetrics, RetryPolicy,
    RetryTransactor, RetryableError, SleepStrategy, TransactorError,
};
pub use rewind::RewindableRequest;
