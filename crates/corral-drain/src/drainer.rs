// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::DrainError;
use crate::job::Job;
use crate::registry::{Connector, Registry};
use crate::tracker::{DrainMetrics, DrainTracker, NoopDrainMetrics, Progress};

/// Devices disconnected per batch when `job.rate == 0` ("as fast as
/// possible").
const UNLIMITED_BATCH_SIZE: u64 = 1000;

enum State {
    NotActive,
    Active(ActiveJob),
}

struct ActiveJob {
    id: u64,
    job: Job,
    tracker: Arc<DrainTracker>,
    cancel: CancellationToken,
    done: CancellationToken,
}

/// A point-in-time status snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    /// Whether a job is currently running.
    pub active: bool,
    /// The normalized job, if one has ever run.
    pub job: Option<Job>,
    /// The current job's progress, if one has ever run.
    pub progress: Option<Progress>,
}

struct Shared {
    registry: Arc<dyn Registry>,
    connector: Arc<dyn Connector>,
    metrics: Arc<dyn DrainMetrics>,
    state: Mutex<State>,
    last: Mutex<Option<(Job, Arc<DrainTracker>)>>,
    next_id: AtomicU64,
}

/// Rate-limited, cancellable device drainer.
///
/// Cheap to clone: internally an `Arc` handle, the way a connection pool or
/// client handle is typically shared across tasks.
#[derive(Clone)]
pub struct Drainer {
    shared: Arc<Shared>,
}

impl Drainer {
    /// Builds a drainer over the given registry and connector.
    pub fn new(registry: Arc<dyn Registry>, connector: Arc<dyn Connector>) -> Self {
        Self::with_metrics(registry, connector, Arc::new(NoopDrainMetrics))
    }

    /// Builds a drainer decorated with a metrics sink.
    pub fn with_metrics(
        registry: Arc<dyn Registry>,
        connector: Arc<dyn Connector>,
        metrics: Arc<dyn DrainMetrics>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                connector,
                metrics,
                state: Mutex::new(State::NotActive),
                last: Mutex::new(None),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Starts a drain job. Fails with [`DrainError::AlreadyActive`] if one
    /// is already running. On success, returns the normalized job and a
    /// token that resolves once the job has finished.
    pub fn start(&self, job: Job) -> Result<(Job, CancellationToken), DrainError> {
        let mut state = self.shared.state.lock();
        if matches!(*state, State::Active(_)) {
            return Err(DrainError::AlreadyActive);
        }

        let normalized = job.normalize(self.shared.registry.len() as u64);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let started = Utc::now();
        let tracker = Arc::new(DrainTracker::new(started));
        let cancel = CancellationToken::new();
        let done = CancellationToken::new();

        *state = State::Active(ActiveJob {
            id,
            job: normalized.clone(),
            tracker: Arc::clone(&tracker),
            cancel: cancel.clone(),
            done: done.clone(),
        });
        drop(state);

        self.shared.metrics.set_draining(true);

        let drainer = self.clone();
        let run_job = normalized.clone();
        let done_for_caller = done.clone();
        tokio::spawn(async move {
            drainer.run(id, run_job, tracker, cancel, done).await;
        });

        Ok((normalized, done_for_caller))
    }

    /// Cancels the active job. Fails with [`DrainError::NotActive`] if none
    /// is running. On success, returns a token that resolves once the
    /// cancelled job has actually stopped.
    ///
    /// The state transition to not-active happens here, synchronously, not
    /// when the drain loop notices the cancellation: `status()` reports
    /// `active: false` the instant this call returns, and a second `cancel()`
    /// issued before the loop has woken up correctly sees no active job.
    pub fn cancel(&self) -> Result<CancellationToken, DrainError> {
        let mut state = self.shared.state.lock();
        match std::mem::replace(&mut *state, State::NotActive) {
            State::Active(active) => {
                active.cancel.cancel();
                let done = active.done.clone();
                drop(state);
                *self.shared.last.lock() = Some((active.job, active.tracker));
                Ok(done)
            }
            State::NotActive => Err(DrainError::NotActive),
        }
    }

    /// A snapshot of the current (or most recent) job's status.
    pub fn status(&self) -> Status {
        let state = self.shared.state.lock();
        if let State::Active(active) = &*state {
            return Status {
                active: true,
                job: Some(active.job.clone()),
                progress: Some(active.tracker.progress()),
            };
        }
        drop(state);
        let last = self.shared.last.lock();
        match &*last {
            Some((job, tracker)) => Status {
                active: false,
                job: Some(job.clone()),
                progress: Some(tracker.progress()),
            },
            None => Status {
                active: false,
                job: None,
                progress: None,
            },
        }
    }

    async fn run(
        &self,
        id: u64,
        job: Job,
        tracker: Arc<DrainTracker>,
        cancel: CancellationToken,
        done: CancellationToken,
    ) {
        let mut remaining = job.count;
        let batch_size = if job.rate > 0 { job.rate } else { UNLIMITED_BATCH_SIZE };
        let mut interval = (job.rate > 0 && !job.tick.is_zero()).then(|| tokio::time::interval(job.tick));

        while remaining > 0 && !cancel.is_cancelled() {
            if let Some(interval) = interval.as_mut() {
                tokio::select! {
                    _ = interval.tick() => {}
                    () = cancel.cancelled() => break,
                }
            }

            let capacity = remaining.min(batch_size);
            let registry = Arc::clone(&self.shared.registry);
            let connector = Arc::clone(&self.shared.connector);
            let metrics = Arc::clone(&self.shared.metrics);
            let filter = job.drain_filter.clone();
            let cancel_for_batch = cancel.clone();
            let tracker_for_batch = Arc::clone(&tracker);

            let (more, visited) = match tokio::task::spawn_blocking(move || {
                crate::batch::next_batch(
                    registry.as_ref(),
                    connector.as_ref(),
                    &cancel_for_batch,
                    filter.as_ref(),
                    capacity,
                    &tracker_for_batch,
                    metrics.as_ref(),
                )
            })
            .await
            {
                Ok(result) => result,
                Err(join_error) => {
                    tracing::error!(job_id = id, error = %join_error, "drain batch task failed; stopping job");
                    (false, 0)
                }
            };

            remaining = remaining.saturating_sub(visited);
            if !more {
                break;
            }
        }

        self.finish(id, tracker, done);
    }

    fn finish(&self, id: u64, tracker: Arc<DrainTracker>, done: CancellationToken) {
        tracker.done(Utc::now());
        self.shared.metrics.set_draining(false);

        let mut state = self.shared.state.lock();
        if matches!(&*state, State::Active(active) if active.id == id) {
            if let State::Active(active) = std::mem::replace(&mut *state, State::NotActive) {
                *self.shared.last.lock() = Some((active.job, Arc::clone(&tracker)));
            }
        }
        drop(state);
        done.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_filter::{Device, DeviceMetadata, MetadataValue};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    struct EmptyMetadata;
    impl DeviceMetadata for EmptyMetadata {
        fn load(&self, _key: &str) -> Option<MetadataValue> {
            None
        }
        fn claims(&self) -> HashMap<String, MetadataValue> {
            HashMap::new()
        }
    }

    struct FakeDevice {
        id: String,
        metadata: EmptyMetadata,
    }
    impl Device for FakeDevice {
        fn id(&self) -> &str {
            &self.id
        }
        fn metadata(&self) -> &dyn DeviceMetadata {
            &self.metadata
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
                let device = FakeDevice {
                    id: i.to_string(),
                    metadata: EmptyMetadata,
                };
                n += 1;
                if !visitor(&device) {
                    break;
                }
            }
            n
        }
    }

    struct CountingConnector {
        disconnected: AtomicUsize,
    }
    impl Connector for CountingConnector {
        fn disconnect(&self, _device_id: &str) -> bool {
            self.disconnected.fetch_add(1, Ordering::Relaxed);
            true
        }
    }

    /// Notifies once the `n`th disconnect happens, then stalls briefly so a
    /// racing test thread has a window to observe it before the next batch
    /// starts.
    struct SignalingConnector {
        disconnected: AtomicUsize,
        signal_at: usize,
        notify: Arc<tokio::sync::Notify>,
    }
    impl Connector for SignalingConnector {
        fn disconnect(&self, _device_id: &str) -> bool {
            let n = self.disconnected.fetch_add(1, Ordering::Relaxed) + 1;
            if n == self.signal_at {
                self.notify.notify_one();
                std::thread::sleep(StdDuration::from_millis(100));
            }
            true
        }
    }

    #[tokio::test]
    async fn drain_to_completion_visits_and_drains_every_device() {
        let registry = Arc::new(FakeRegistry { count: 1709 });
        let connector = Arc::new(CountingConnector {
            disconnected: AtomicUsize::new(0),
        });
        let drainer = Drainer::new(registry, connector);

        let (job, done) = drainer
            .start(Job {
                rate: 500,
                tick: StdDuration::from_millis(5),
                ..Job::default()
            })
            .unwrap();
        assert_eq!(job.count, 1709);

        tokio::time::timeout(StdDuration::from_secs(1), done.cancelled())
            .await
            .expect("job did not finish");

        let status = drainer.status();
        assert!(!status.active);
        let progress = status.progress.unwrap();
        assert_eq!(progress.visited, 1709);
        assert_eq!(progress.drained, 1709);
        assert!(progress.finished.is_some());
    }

    #[tokio::test]
    async fn cancel_mid_flight_stops_after_current_batch() {
        let registry = Arc::new(FakeRegistry { count: 1_000_000 });
        let notify = Arc::new(tokio::sync::Notify::new());
        let connector = Arc::new(SignalingConnector {
            disconnected: AtomicUsize::new(0),
            signal_at: 1000,
            notify: Arc::clone(&notify),
        });
        let drainer = Drainer::new(registry, connector);

        drainer.start(Job::default()).unwrap();
        notify.notified().await;

        let done = drainer.cancel().unwrap();
        tokio::time::timeout(StdDuration::from_secs(1), done.cancelled())
            .await
            .expect("job did not stop after cancel");

        let status = drainer.status();
        assert!(!status.active);
        assert!(status.progress.unwrap().visited <= 1000);
        assert_eq!(drainer.cancel().unwrap_err(), DrainError::NotActive);
    }

    #[tokio::test]
    async fn cancel_flips_active_to_false_before_the_loop_notices() {
        let registry = Arc::new(FakeRegistry { count: 1_000_000 });
        let connector = Arc::new(CountingConnector {
            disconnected: AtomicUsize::new(0),
        });
        let drainer = Drainer::new(registry, connector);

        drainer.start(Job::default()).unwrap();
        drainer.cancel().unwrap();

        assert!(!drainer.status().active);
        assert_eq!(drainer.cancel().unwrap_err(), DrainError::NotActive);
    }

    #[tokio::test]
    async fn second_start_while_active_reports_already_active() {
        let registry = Arc::new(FakeRegistry { count: 5 });
        let connector = Arc::new(CountingConnector {
            disconnected: AtomicUsize::new(0),
        });
        let drainer = Drainer::new(registry, connector);

        drainer.start(Job::default()).unwrap();
        let err = drainer.start(Job::default()).unwrap_err();
        assert_eq!(err, DrainError::AlreadyActive);
    }
}
