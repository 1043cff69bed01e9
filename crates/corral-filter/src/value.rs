// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// A scalar value carried by a filter set or a device's metadata/claims.
///
/// The wire format only ever emits these three JSON scalar kinds; a
/// non-integer JSON number is rejected by the admin surface rather than
/// accepted here, since nothing downstream of the filter store knows what
/// to do with a float.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// A JSON boolean.
    Bool(bool),
    /// A JSON integer.
    Int(i64),
    /// A JSON string.
    String(String),
}

/// The value a [`crate::DeviceMetadata`] namespace reports for a key: either
/// a single scalar or an array of scalars (matched element-wise).
#[derive(Debug, Clone, PartialEq, Hash, Eq)]
pub enum MetadataValue {
    /// A single scalar value.
    Scalar(FilterValue),
    /// An array of scalar values; a filter matches if any element matches.
    Array(Vec<FilterValue>),
}

impl From<FilterValue> for MetadataValue {
    fn from(value: FilterValue) -> Self {
        MetadataValue::Scalar(value)
    }
}
