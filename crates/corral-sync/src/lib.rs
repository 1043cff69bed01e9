// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Counting, binary, and closeable semaphores shared by the cooperative HTTP
//! handlers and the drainer's optional concurrency limits.

mod closeable;
mod counting;
mod error;
mod metrics;

pub use closeable::{CloseableBinarySemaphore, CloseableSemaphore};
pub use counting::{BinarySemaphore, CountingSemaphore};
pub use error::{AcquireError, AlreadyClosed};
pub use metrics::{NoopMetrics, SemaphoreMetrics};
