// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::mpsc::sync_channel;

use tokio_util::sync::CancellationToken;

use corral_filter::Device;

use crate::job::DrainFilter;
use crate::registry::{Connector, Registry};
use crate::tracker::{DrainMetrics, DrainTracker};

/// Enqueues up to `capacity` filter-matching devices, then dispatches
/// disconnects for each, per `spec.md` §4.9's `nextBatch`.
///
/// Returns `(more, visited_this_batch)`: `more` is `false` once the
/// registry has nothing left to enqueue or cancellation was observed;
/// `visited_this_batch` is the number of devices actually enqueued for
/// disconnection (matched devices, not skipped ones).
pub fn next_batch(
    registry: &dyn Registry,
    connector: &dyn Connector,
    cancel: &CancellationToken,
    filter: Option<&DrainFilter>,
    capacity: u64,
    tracker: &DrainTracker,
    metrics: &dyn DrainMetrics,
) -> (bool, u64) {
    let capacity = capacity.max(1) as usize;
    let (tx, rx) = sync_channel::<String>(capacity);
    let mut visited = 0u64;
    let mut skipped = 0u64;
    let mut cancelled_during_enqueue = false;

    registry.visit_all(&mut |device: &dyn Device| {
        if cancel.is_cancelled() {
            cancelled_during_enqueue = true;
            return false;
        }
        if let Some(filter) = filter {
            if !filter.matches(device.metadata()) {
                skipped += 1;
                return true;
            }
        }
        match tx.try_send(device.id().to_string()) {
            Ok(()) => {
                visited += 1;
                true
            }
            Err(_) => false,
        }
    });
    drop(tx);

    tracker.add_skipped(skipped);

    if visited == 0 {
        return (false, 0);
    }
    tracker.add_visited(visited);

    let mut drained = 0u64;
    for id in rx.iter() {
        if cancel.is_cancelled() {
            break;
        }
        if connector.disconnect(&id) {
            drained += 1;
        }
    }
    tracker.add_drained(drained, metrics);

    let more = !cancelled_during_enqueue && !cancel.is_cancelled();
    (more, visited)
}
