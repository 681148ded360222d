//! Build sequencing.
//!
//! [`BuildCoordinator`] owns the build state and guarantees that at most one
//! pipeline run is active. The whole "check idle, mark busy" transition
//! happens under a single mutex, so two requests arriving at the same
//! instant cannot both start a build.
//!
//! # States
//!
//! ```text
//!            request                      run finished, nothing owed
//!   Idle ─────────────▶ Building ─────────────────────────────────▶ Idle
//!                        │    ▲
//!        request (busy)  │    │ run finished, follow-up owed
//!                        ▼    │ (after requeue delay)
//!                        Queued
//! ```
//!
//! Requests that arrive while busy are handled by the [`QueuePolicy`]:
//!
//! - **Coalesce**: the request's data is folded into one pending follow-up
//!   and `queue_depth` counts how many requests it stands for. However many
//!   requests pile up, exactly one extra run happens.
//! - **Reject**: the request is answered with a conflict and forgotten.
//!
//! The coordinator stays `in_progress` between a run and its follow-up so
//! the requeue delay cannot be used to sneak in a parallel run.

use crate::config::QueuePolicy;
use crate::pipeline::{BuildError, BuildReport, Pipeline};
use crate::types::{BuildAcceptance, BuildRequest, BuildResult, BuildState, CmsData};
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Shared {
    state: BuildState,
    /// Data for the owed follow-up run, if any.
    pending: Option<CmsData>,
}

struct Inner {
    shared: Mutex<Shared>,
    pipeline: Pipeline,
    policy: QueuePolicy,
    requeue_delay: Duration,
    idle: Notify,
}

/// Cloneable handle; all clones share one state.
#[derive(Clone)]
pub struct BuildCoordinator {
    inner: Arc<Inner>,
}

impl BuildCoordinator {
    pub fn new(pipeline: Pipeline, policy: QueuePolicy, requeue_delay: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                shared: Mutex::new(Shared::default()),
                pipeline,
                policy,
                requeue_delay,
                idle: Notify::new(),
            }),
        }
    }

    /// Accept a build request.
    ///
    /// Never waits for a build; when a run starts it continues on a spawned
    /// task. Must be called from within a Tokio runtime.
    pub fn request_build(&self, request: BuildRequest) -> BuildAcceptance {
        let trigger = request.trigger.unwrap_or_else(|| "unspecified".to_string());
        let data = request.data;
        if data.is_empty() {
            debug!(%trigger, "request carries no data, snapshot will be used");
        }

        let mut shared = self.inner.lock();
        if shared.state.in_progress {
            return match self.inner.policy {
                QueuePolicy::Reject => {
                    info!(%trigger, "build already running, rejecting request");
                    BuildAcceptance::Conflict
                }
                QueuePolicy::Coalesce => {
                    shared.pending = Some(match shared.pending.take() {
                        Some(owed) => owed.overlay(data),
                        None => data,
                    });
                    shared.state.queue_depth += 1;
                    let queue_length = shared.state.queue_depth;
                    info!(%trigger, queue_length, "build already running, follow-up queued");
                    BuildAcceptance::Queued { queue_length }
                }
            };
        }

        shared.state.in_progress = true;
        drop(shared);

        let timestamp = Utc::now();
        info!(%trigger, "build started");
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { run_chain(inner, data).await });
        BuildAcceptance::Building { timestamp }
    }

    /// Snapshot of the current state.
    pub fn status(&self) -> BuildState {
        self.inner.lock().state.clone()
    }

    /// Resolve once no run is active and no follow-up is owed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.inner.lock().state.in_progress {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    /// Lock the shared state, recovering from a poisoned mutex.
    ///
    /// Nothing panics while holding the lock, and the state is plain data
    /// that stays consistent between statements.
    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record a finished run. Returns the follow-up data if one is owed,
    /// otherwise marks the coordinator idle.
    fn finish(&self, result: &Result<BuildReport, BuildError>) -> Option<CmsData> {
        let mut shared = self.lock();
        shared.state.last_build_time = Some(Utc::now());
        match result {
            Ok(_) => {
                shared.state.last_result = Some(BuildResult::Success);
                shared.state.last_error = None;
            }
            Err(e) => {
                shared.state.last_result = Some(BuildResult::Failure);
                shared.state.last_error = Some(e.to_string());
            }
        }

        match shared.pending.take() {
            Some(data) => {
                shared.state.queue_depth = 0;
                Some(data)
            }
            None => {
                shared.state.in_progress = false;
                drop(shared);
                self.idle.notify_waiters();
                None
            }
        }
    }
}

/// Run the pipeline, then any owed follow-up, until nothing is owed.
async fn run_chain(inner: Arc<Inner>, first: CmsData) {
    let mut data = first;
    loop {
        // A panic inside the pipeline must not leave the coordinator stuck busy
        let pipeline = inner.pipeline.clone();
        let result = match tokio::spawn(async move { pipeline.run(data).await }).await {
            Ok(result) => result,
            Err(e) => Err(BuildError::Aborted(e.to_string())),
        };

        match &result {
            Ok(report) => info!(
                duration_ms = report.duration.as_millis() as u64,
                files = report.published.files,
                "build succeeded"
            ),
            Err(e) => error!(error = %e, "build failed"),
        }

        match inner.finish(&result) {
            Some(next) => {
                info!(
                    delay_ms = inner.requeue_delay.as_millis() as u64,
                    "running queued follow-up build"
                );
                tokio::time::sleep(inner.requeue_delay).await;
                data = next;
            }
            None => break,
        }
    }
}
