// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Drain job lifecycle: normalize, enqueue in batches, disconnect, throttle
//! by tick, observe cancellation, publish progress.

mod batch;
mod drainer;
mod error;
mod job;
mod registry;
mod tracker;

pub use drainer::{Drainer, Status};
pub use error::DrainError;
pub use job::{DrainFilter, Job};
pub use registry::{Connector, Registry};
pub use tracker::{DrainMetrics, DrainTracker, NoopDrainMetrics, Progress};
