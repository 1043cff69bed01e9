// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure modes surfaced by [`crate::Drainer`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainError {
    /// `Start` was called while a job is already running.
    #[error("a drain job is already active")]
    AlreadyActive,
    /// `Cancel` was called while no job is running.
    #[error("no drain job is active")]
    NotActive,
}
