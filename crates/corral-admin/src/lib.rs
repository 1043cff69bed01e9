// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP handlers that read/add/delete filters and start/observe/cancel a
//! drain job, merged into one `axum::Router`.

mod drain;
mod error;
mod filters;

use std::sync::Arc;

use axum::Router;
use corral_drain::Drainer;
use corral_filter::FilterGate;

pub use error::AdminError;

/// Shared state behind every admin handler.
#[derive(Clone)]
pub struct AppState {
    /// The filter store consulted by device connection admission.
    pub gate: Arc<FilterGate>,
    /// The drainer driving `/drain`.
    pub drainer: Drainer,
}

/// Builds the merged admin router: `/filters` (C7) and `/drain` (C10).
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(filters::router(state.clone()))
        .merge(drain::router().with_state(state))
}

#[cfg(test)]
mod test_support {
    use std::sync::Arc;

    use corral_drain::{Connector, Drainer, Registry};
    use corral_filter::{Device, DeviceMetadata, MetadataValue};
    use std::collections::HashMap;

    use crate::AppState;

    struct NoMetadata;
    impl DeviceMetadata for NoMetadata {
        fn load(&self, _key: &str) -> Option<MetadataValue> {
            None
        }
        fn claims(&self) -> HashMap<String, MetadataValue> {
            HashMap::new()
        }
    }

    struct FakeDevice {
        id: String,
    }
    impl Device for FakeDevice {
        fn id(&self) -> &str {
            &self.id
        }
        fn metadata(&self) -> &dyn DeviceMetadata {
            &NoMetadata
        }
    }

    struct FakeRegistry {
        count: usize,
    }
    impl Registry for FakeRegistry {
        fn len(&self) -> usize {
            self.count
        }
        fn visit_all(&self, visitor: &mut dyn FnMut(&dyn Device) -> bool) -> usize {
            let mut n = 0;
            for i in 0..self.count {
                let device = FakeDevice { id: i.to_string() };
                n += 1;
                if !visitor(&device) {
                    break;
                }
            }
            n
        }
    }

    struct FakeConnector;
    impl Connector for FakeConnector {
        fn disconnect(&self, _device_id: &str) -> bool {
            true
        }
    }

    pub(crate) fn test_state() -> AppState {
        AppState {
            gate: Arc::new(corral_filter::FilterGate::new()),
            drainer: Drainer::new(Arc::new(FakeRegistry { count: 10 }), Arc::new(FakeConnector)),
        }
    }
}
