// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Device-admission filter engine: a key/value-set filter store, an
//! optional allow-list of settable keys, and `AllowConnection` matching
//! against a device's metadata and claims.

mod gate;
mod value;

pub use gate::{
    metadata_match, Device, DeviceMetadata, FilterGate, FilterGateWire, FilterSet, Location,
    MatchResult,
};
pub use value::{FilterValue, MetadataValue};
