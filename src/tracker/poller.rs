//! Status polling for a single mosaic job.
//!
//! The poller owns one background task at a time. Every call to
//! [`JobStatusPoller::start`] bumps the epoch and tags each emitted
//! [`PollEvent`] with it, so the sink can discard anything produced by a
//! loop it has since abandoned. Each result is handed to the sink inside
//! the tick that fetched it; the next tick is only armed after the sink
//! returns. Stopping is cooperative: the pending wait is cancelled, but a
//! fetch already on the wire is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::models::job::{Job, JobId};
use crate::services::api::ServiceError;
use crate::services::jobs::MosaicJobService;

/// Default status polling cadence.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;

/// One tick's worth of information, delivered to the sink.
#[derive(Debug)]
pub struct PollEvent {
    pub epoch: u64,
    pub job_id: JobId,
    pub outcome: Result<Job, ServiceError>,
}

/// Receiver of poll results.
pub trait PollSink: Send + Sync {
    /// Apply one result. Returns whether polling should go on.
    fn deliver(&self, event: PollEvent) -> bool;
}

pub struct JobStatusPoller {
    jobs: Arc<dyn MosaicJobService>,
    sink: Arc<dyn PollSink>,
    interval: Duration,
    epoch: u64,
    active: Option<CancellationToken>,
}

impl JobStatusPoller {
    pub fn new(jobs: Arc<dyn MosaicJobService>, sink: Arc<dyn PollSink>) -> Self {
        Self {
            jobs,
            sink,
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            epoch: 0,
            active: None,
        }
    }

    /// Takes effect on the next `start`.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Epoch of the most recent `start`. Events tagged otherwise are stale.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Whether the current loop is still alive. A loop that ended on its
    /// own (terminal status, failed fetch, sink said stop) is not running.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    /// Begin polling `job_id`: first fetch right away, then once per interval.
    /// Any previous loop is stopped first. Returns the new epoch.
    pub fn start(&mut self, job_id: JobId) -> u64 {
        self.stop();
        self.epoch += 1;

        let token = CancellationToken::new();
        self.active = Some(token.clone());

        debug!(job_id = %job_id, epoch = self.epoch, "Starting status poller");
        tokio::spawn(poll_loop(
            Arc::clone(&self.jobs),
            Arc::clone(&self.sink),
            job_id,
            self.epoch,
            self.interval,
            token,
        ));
        self.epoch
    }

    /// Cancel the pending wait, if any. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some(token) = self.active.take() {
            debug!(epoch = self.epoch, "Stopping status poller");
            token.cancel();
        }
    }
}

impl Drop for JobStatusPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    jobs: Arc<dyn MosaicJobService>,
    sink: Arc<dyn PollSink>,
    job_id: JobId,
    epoch: u64,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        metrics::counter!("mosaic_status_polls_total").increment(1);
        let outcome = jobs.get_status(&job_id).await;
        if let Err(e) = &outcome {
            warn!(job_id = %job_id, epoch, error = %e, "Status check failed");
        }

        let keep_going = sink.deliver(PollEvent {
            epoch,
            job_id: job_id.clone(),
            outcome,
        });
        if !keep_going || token.is_cancelled() {
            break;
        }
    }

    token.cancel();
    debug!(job_id = %job_id, epoch, "Status poller exited");
}
