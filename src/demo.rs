// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! An in-memory fleet used to exercise the admin surface without a real
//! transport. Every device reports the same `partner-id` claim so
//! `/filters` has something to match against out of the box.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use corral_drain::{Connector, Registry};
use corral_filter::{Device, DeviceMetadata, FilterValue, MetadataValue};

struct DemoMetadata {
    claims: HashMap<String, MetadataValue>,
}

impl DeviceMetadata for DemoMetadata {
    fn load(&self, _key: &str) -> Option<MetadataValue> {
        None
    }

    fn claims(&self) -> HashMap<String, MetadataValue> {
        self.claims.clone()
    }
}

struct DemoDevice {
    id: String,
    metadata: DemoMetadata,
}

impl Device for DemoDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> &dyn DeviceMetadata {
        &self.metadata
    }
}

/// A fixed-size fleet of devices with a disconnect set tracked in memory, so
/// `visit_all` stops offering devices once `Connector::disconnect` removes
/// them.
pub struct DemoRegistry {
    connected: Mutex<Vec<bool>>,
}

impl DemoRegistry {
    /// Seeds `count` devices, all initially connected.
    pub fn new(count: usize) -> Self {
        Self {
            connected: Mutex::new(vec![true; count]),
        }
    }

    fn device(index: usize) -> DemoDevice {
        DemoDevice {
            id: format!("device-{index}"),
            metadata: DemoMetadata {
                claims: HashMap::from([(
                    "partner-id".to_string(),
                    MetadataValue::Scalar(FilterValue::String("demo".to_string())),
                )]),
            },
        }
    }
}

impl Registry for DemoRegistry {
    fn len(&self) -> usize {
        self.connected.lock().unwrap_or_else(|e| e.into_inner()).iter().filter(|c| **c).count()
    }

    fn visit_all(&self, visitor: &mut dyn FnMut(&dyn Device) -> bool) -> usize {
        let connected = self.connected.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let mut visited = 0;
        for (index, is_connected) in connected.into_iter().enumerate() {
            if !is_connected {
                continue;
            }
            visited += 1;
            if !visitor(&Self::device(index)) {
                break;
            }
        }
        visited
    }
}

/// Disconnects devices from a shared [`DemoRegistry`] by parsing their
/// `device-{n}` id back into an index.
pub struct DemoConnector {
    registry: std::sync::Arc<DemoRegistry>,
    disconnected: AtomicUsize,
}

impl DemoConnector {
    /// Builds a connector that mutates `registry`'s connected set.
    pub fn new(registry: std::sync::Arc<DemoRegistry>) -> Self {
        Self {
            registry,
            disconnected: AtomicUsize::new(0),
        }
    }
}

impl Connector for DemoConnector {
    fn disconnect(&self, device_id: &str) -> bool {
        let Some(index) = device_id.strip_prefix("device-").and_then(|s| s.parse::<usize>().ok()) else {
            return false;
        };
        let mut connected = self.registry.connected.lock().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = connected.get_mut(index) else {
            return false;
        };
        let was_connected = std::mem::replace(slot, false);
        if was_connected {
            self.disconnected.fetch_add(1, Ordering::Relaxed);
        }
        was_connected
    }
}
