// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure modes shared by the cooperative HTTP building blocks.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpUtilError {
    /// A write, `WriteTo`, or `Close` call was made on an already-closed
    /// [`crate::BufferedWriter`].
    #[error("buffered writer is already closed")]
    WriterClosed,
    /// The request body could not be made rewindable (it is a one-shot
    /// stream rather than an in-memory buffer) and no prior capture exists.
    #[error("request body is not rewindable")]
    NotRewindable,
}
