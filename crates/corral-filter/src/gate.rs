// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use serde::{Serialize, Serializer};

use crate::value::{FilterValue, MetadataValue};

/// A concurrent set of [`FilterValue`]s. Serializes as an order-unspecified
/// JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet(HashSet<FilterValue>);

impl FilterSet {
    /// Builds a set from an iterator of values.
    pub fn new(values: impl IntoIterator<Item = FilterValue>) -> Self {
        Self(values.into_iter().collect())
    }

    /// Whether `value` is a member of this set.
    pub fn has(&self, value: &FilterValue) -> bool {
        self.0.contains(value)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Visits every member; order is unspecified.
    pub fn visit_all(&self, mut visit: impl FnMut(&FilterValue)) {
        for value in &self.0 {
            visit(value);
        }
    }
}

impl Serialize for FilterSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Mapping from filter key to [`FilterSet`], guarded by one read-many/
/// write-one lock shared with the optional allow-list.
#[derive(Default)]
struct Inner {
    filters: HashMap<String, FilterSet>,
    allowed: Option<FilterSet>,
}

/// Where a matched value came from on the device side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Location {
    /// The value came from `DeviceMetadata::load`.
    MetadataMap,
    /// The value came from `DeviceMetadata::claims`.
    Claims,
}

/// The key and namespace a filter matched on. Empty (`key` is `None`) means
/// no filter matched.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MatchResult {
    /// The namespace the match was found in.
    pub location: Option<Location>,
    /// The filter key that matched.
    pub key: Option<String>,
}

impl MatchResult {
    fn none() -> Self {
        Self::default()
    }

    fn matched(location: Location, key: impl Into<String>) -> Self {
        Self {
            location: Some(location),
            key: Some(key.into()),
        }
    }
}

/// Per-device metadata and claims, consulted by [`FilterGate::allow_connection`].
pub trait DeviceMetadata: Send + Sync {
    /// Looks up `key` in the device's metadata map.
    fn load(&self, key: &str) -> Option<MetadataValue>;
    /// The device's full claims map.
    fn claims(&self) -> HashMap<String, MetadataValue>;
}

/// A device consulted by [`FilterGate::allow_connection`].
pub trait Device: Send + Sync {
    /// The device's stable identifier.
    fn id(&self) -> &str;
    /// The device's metadata/claims source.
    fn metadata(&self) -> &dyn DeviceMetadata;
}

/// Guards a [`FilterSet`]-keyed filter store plus an optional allow-list of
/// settable keys, and answers device-admission queries against them.
pub struct FilterGate {
    inner: RwLock<Inner>,
}

impl FilterGate {
    /// Builds an empty gate with no allow-list (every key may be set).
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Builds a gate restricted to the given set of settable keys.
    pub fn with_allowed_filters(allowed: FilterSet) -> Self {
        Self {
            inner: RwLock::new(Inner {
                filters: HashMap::new(),
                allowed: Some(allowed),
            }),
        }
    }

    /// Holds the read lock and invokes `visit(key, set)` for every entry,
    /// stopping early if `visit` returns `false`.
    pub fn visit_all(&self, mut visit: impl FnMut(&str, &FilterSet) -> bool) {
        let guard = self.inner.read();
        for (key, set) in &guard.filters {
            if !visit(key, set) {
                break;
            }
        }
    }

    /// Read-lock snapshot of a single key.
    pub fn get_filter(&self, key: &str) -> Option<FilterSet> {
        self.inner.read().filters.get(key).cloned()
    }

    /// Replaces (not merges) the filter set for `key`. Returns the
    /// previous set (if any) and whether the key was newly created.
    pub fn set_filter(&self, key: impl Into<String>, values: FilterSet) -> (Option<FilterSet>, bool) {
        let mut guard = self.inner.write();
        let key = key.into();
        let old = guard.filters.insert(key, values);
        let created = old.is_none();
        (old, created)
    }

    /// Deletes `key`. Returns whether it was present.
    pub fn delete_filter(&self, key: &str) -> bool {
        self.inner.write().filters.remove(key).is_some()
    }

    /// The allow-list, if one is configured.
    pub fn get_allowed_filters(&self) -> Option<FilterSet> {
        self.inner.read().allowed.clone()
    }

    /// Whether `key` may be set via the admin surface: `true` when no
    /// allow-list is configured, or when the allow-list contains `key`.
    pub fn is_key_allowed(&self, key: &str) -> bool {
        match &self.inner.read().allowed {
            None => true,
            Some(allowed) => allowed.has(&FilterValue::String(key.to_string())),
        }
    }

    /// Decides whether `device` may connect: iterates every `(key, set)`
    /// pair under the read lock and runs [`metadata_match`]; returns
    /// `(false, match)` on the first match, `(true, MatchResult::none())`
    /// otherwise.
    pub fn allow_connection(&self, device: &dyn Device) -> (bool, MatchResult) {
        let guard = self.inner.read();
        for (key, set) in &guard.filters {
            if let Some(result) = metadata_match(key, set, device.metadata()) {
                return (false, result);
            }
        }
        (true, MatchResult::none())
    }

    /// Serializes the gate as the wire-format `FilterGate` JSON object.
    pub fn to_wire(&self) -> FilterGateWire {
        let guard = self.inner.read();
        FilterGateWire {
            filters: guard.filters.clone(),
            allowed_filters: guard.allowed.clone(),
        }
    }
}

impl Default for FilterGate {
    fn default() -> Self {
        Self::new()
    }
}

/// The `FilterGate` wire representation (`§6` of the spec): `filters` maps
/// key to value array, `allowedFilters` is `null` when unrestricted.
#[derive(Debug, Serialize)]
pub struct FilterGateWire {
    filters: HashMap<String, FilterSet>,
    #[serde(rename = "allowedFilters")]
    allowed_filters: Option<FilterSet>,
}

/// Consults `metadata.load(key)`, falling back to `metadata.claims()[key]`
/// on miss. Returns `Some(result)` naming the namespace the match was found
/// in, or `None` if neither namespace matches (including when neither
/// namespace has the key at all).
pub fn metadata_match(key: &str, filter_set: &FilterSet, metadata: &dyn DeviceMetadata) -> Option<MatchResult> {
    let (value, location) = match metadata.load(key) {
        Some(value) => (value, Location::MetadataMap),
        None => match metadata.claims().remove(key) {
            Some(value) => (value, Location::Claims),
            None => return None,
        },
    };

    let hit = match &value {
        MetadataValue::Scalar(scalar) => filter_set.has(scalar),
        MetadataValue::Array(values) => values.iter().any(|v| filter_set.has(v)),
    };

    hit.then(|| MatchResult::matched(location, key))
}
