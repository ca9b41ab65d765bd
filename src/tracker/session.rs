//! Generation session: the state machine behind the "generate mosaic" view.
//!
//! ```text
//! Idle --submit--> Submitting --job id--> Polling --completed--> Completed
//!                       |                    |
//!                       +--error--> Failed <-+--failed / status check error
//! ```
//!
//! `Completed` and `Failed` accept a fresh `submit`. `reset` returns to
//! `Idle` from anywhere. The session owns the active job and the poller.
//! The poller task hands each result to the session's shared core, which
//! applies it before the next tick is armed, and only when the result's
//! epoch matches the one recorded at the last `start`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use garde::Validate;
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::job::{Job, JobId, JobStatus};
use crate::models::project::{ProjectId, ProjectMeta};
use crate::models::settings::GenerationRequest;
use crate::services::api::ServiceError;
use crate::services::jobs::MosaicJobService;
use crate::services::projects::ProjectStore;
use crate::tracker::history::JobHistoryCache;
use crate::tracker::poller::{JobStatusPoller, PollEvent, PollSink};
use crate::tracker::selection::MosaicSelection;
use crate::tracker::selector::{self, Quality, ResultUnavailable};

/// Shown when the backend marks a job failed without saying why.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Mosaic generation failed";

#[derive(Debug, Clone, Copy, Display, PartialEq, Eq)]
#[strum(serialize_all = "kebab-case")]
pub enum SessionState {
    Idle,
    Submitting,
    #[strum(to_string = "in-progress")]
    Polling,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid generation request: {0}")]
    Validation(String),

    #[error("Failed to start mosaic generation")]
    Submission { detail: String },

    /// Message reported by the job service, verbatim.
    #[error("{0}")]
    GenerationFailure(String),

    #[error("Failed to check generation status")]
    PollingTransport { detail: String },

    #[error("Job {0} is still {1}; only finished jobs can be opened from history")]
    HistoryEntryNotTerminal(JobId, JobStatus),

    #[error("Job {0} is not in the project history")]
    UnknownHistoryEntry(JobId),
}

impl From<garde::Report> for SessionError {
    fn from(report: garde::Report) -> Self {
        SessionError::Validation(report.to_string())
    }
}

/// What observers see of a session at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub job_id: Option<JobId>,
    pub progress: u8,
    pub error: Option<SessionError>,
}

pub struct GenerationSession {
    project: Option<ProjectMeta>,
    core: Arc<SessionCore>,
    poller: JobStatusPoller,
    updates: watch::Receiver<SessionSnapshot>,
}

/// State shared between the session handle and its poller task.
struct SessionCore {
    id: Uuid,
    jobs: Arc<dyn MosaicJobService>,
    history: Arc<JobHistoryCache>,
    inner: Mutex<Inner>,
    observers: watch::Sender<SessionSnapshot>,
}

struct Inner {
    state: SessionState,
    epoch: u64,
    active_id: Option<JobId>,
    active: Option<Job>,
    progress: u8,
    last_error: Option<SessionError>,
    history_refresh: Option<JoinHandle<()>>,
}

impl Inner {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            job_id: self.active_id.clone(),
            progress: self.progress,
            error: self.last_error.clone(),
        }
    }

    fn clear_job(&mut self) {
        self.active_id = None;
        self.active = None;
        self.progress = 0;
        self.last_error = None;
    }
}

impl GenerationSession {
    /// New idle session for the project the history cache belongs to.
    pub fn new(jobs: Arc<dyn MosaicJobService>, history: Arc<JobHistoryCache>) -> Self {
        let inner = Inner {
            state: SessionState::Idle,
            epoch: 0,
            active_id: None,
            active: None,
            progress: 0,
            last_error: None,
            history_refresh: None,
        };
        let (observers, updates) = watch::channel(inner.snapshot());

        let core = Arc::new(SessionCore {
            id: Uuid::new_v4(),
            jobs: Arc::clone(&jobs),
            history,
            inner: Mutex::new(inner),
            observers,
        });
        let poller = JobStatusPoller::new(jobs, Arc::clone(&core) as Arc<dyn PollSink>);

        Self {
            project: None,
            core,
            poller,
            updates,
        }
    }

    /// Look the project up first, then open a session bound to it.
    pub async fn open(
        projects: &dyn ProjectStore,
        jobs: Arc<dyn MosaicJobService>,
        history: Arc<JobHistoryCache>,
    ) -> Result<Self, ServiceError> {
        let project = projects.get_project(history.project_id()).await?;
        info!(project_id = project.id, name = %project.name, "Opening generation session");

        let mut session = Self::new(jobs, history);
        session.project = Some(project);
        Ok(session)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poller.set_interval(interval);
        self
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.core.history.project_id()
    }

    pub fn project(&self) -> Option<&ProjectMeta> {
        self.project.as_ref()
    }

    pub fn history(&self) -> &Arc<JobHistoryCache> {
        &self.core.history
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    pub fn progress(&self) -> u8 {
        self.core.lock().progress
    }

    pub fn error(&self) -> Option<SessionError> {
        self.core.lock().last_error.clone()
    }

    pub fn error_message(&self) -> Option<String> {
        self.core.lock().last_error.as_ref().map(ToString::to_string)
    }

    pub fn active_job_id(&self) -> Option<JobId> {
        self.core.lock().active_id.clone()
    }

    /// Latest payload seen for the active job.
    pub fn active_job(&self) -> Option<Job> {
        self.core.lock().active.clone()
    }

    pub fn is_submitting(&self) -> bool {
        self.state() == SessionState::Submitting
    }

    pub fn is_polling(&self) -> bool {
        self.poller.is_running()
    }

    pub fn poll_epoch(&self) -> u64 {
        self.poller.epoch()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.core.lock().snapshot()
    }

    /// Receive a fresh snapshot on every state or progress change.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.core.observers.subscribe()
    }

    /// Result location for the active job at the given quality.
    pub fn result(&self, quality: Quality) -> Result<String, ResultUnavailable> {
        let inner = self.core.lock();
        let job = inner.active.as_ref().ok_or(ResultUnavailable::NoJob)?;
        selector::select_result(job, quality).map(str::to_string)
    }

    /// Start a new generation. Any job still being tracked is abandoned.
    ///
    /// Invalid requests are rejected before anything else happens, leaving
    /// the session untouched.
    pub async fn submit(&mut self, request: GenerationRequest) -> Result<JobId, SessionError> {
        request.validate()?;

        self.poller.stop();
        {
            let mut inner = self.core.lock();
            inner.clear_job();
            self.core.transition(&mut inner, SessionState::Submitting);
        }
        self.updates.borrow_and_update();
        metrics::counter!("mosaic_jobs_submitted_total").increment(1);

        match self.core.jobs.submit(self.project_id(), &request).await {
            Ok(submitted) => {
                info!(
                    session_id = %self.core.id,
                    job_id = %submitted.id,
                    tiles = request.tile_image_ids.len(),
                    "Mosaic job created, polling for status"
                );
                // Held until the epoch is recorded so the first delivery sees it
                let mut inner = self.core.lock();
                inner.active_id = Some(submitted.id.clone());
                self.core.transition(&mut inner, SessionState::Polling);
                self.updates.borrow_and_update();
                inner.epoch = self.poller.start(submitted.id.clone());
                Ok(submitted.id)
            }
            Err(e) => {
                warn!(session_id = %self.core.id, error = %e, "Mosaic submission failed");
                let err = SessionError::Submission {
                    detail: e.to_string(),
                };
                {
                    let mut inner = self.core.lock();
                    self.core.fail(&mut inner, err.clone());
                }
                self.updates.borrow_and_update();
                Err(err)
            }
        }
    }

    pub async fn submit_selection(
        &mut self,
        selection: &MosaicSelection,
    ) -> Result<JobId, SessionError> {
        let request = selection.to_request()?;
        self.submit(request).await
    }

    /// Wait for the next change the poller applies to the session.
    /// Returns `None` once the session is no longer polling and every
    /// change has been seen.
    pub async fn next_update(&mut self) -> Option<SessionSnapshot> {
        if self.updates.has_changed().unwrap_or(false) {
            return Some(self.updates.borrow_and_update().clone());
        }
        if self.state() != SessionState::Polling {
            return None;
        }
        self.updates.changed().await.ok()?;
        Some(self.updates.borrow_and_update().clone())
    }

    /// Wait until the active job settles.
    pub async fn wait_for_terminal(&mut self) -> SessionState {
        while self.next_update().await.is_some() {}
        self.state()
    }

    /// Back to `Idle`. The poller is always stopped.
    pub fn reset(&mut self) {
        self.poller.stop();
        {
            let mut inner = self.core.lock();
            inner.clear_job();
            self.core.transition(&mut inner, SessionState::Idle);
        }
        self.updates.borrow_and_update();
    }

    /// Show a finished job from history as the active one, as-is.
    pub fn select_history(&mut self, job: Job) -> Result<(), SessionError> {
        if !job.status.is_terminal() {
            return Err(SessionError::HistoryEntryNotTerminal(job.id, job.status));
        }

        self.poller.stop();
        {
            let mut inner = self.core.lock();
            inner.active_id = Some(job.id.clone());
            inner.progress = job.progress;

            if job.status == JobStatus::Completed {
                inner.last_error = None;
                inner.active = Some(job);
                self.core.transition(&mut inner, SessionState::Completed);
            } else {
                inner.last_error = Some(SessionError::GenerationFailure(failure_message(&job)));
                inner.active = Some(job);
                self.core.transition(&mut inner, SessionState::Failed);
            }
        }
        self.updates.borrow_and_update();
        Ok(())
    }

    pub fn select_history_id(&mut self, job_id: &JobId) -> Result<(), SessionError> {
        let job = self
            .core
            .history
            .get(job_id)
            .ok_or_else(|| SessionError::UnknownHistoryEntry(job_id.clone()))?;
        self.select_history(job)
    }

    /// Refresh the project history now, independent of any job.
    pub async fn refresh_history(&self) -> Result<usize, ServiceError> {
        self.core.history.refresh(self.core.jobs.as_ref()).await
    }

    /// Wait for the refresh spawned by the last completion, if any.
    pub async fn flush_history_refresh(&self) {
        let handle = self.core.lock().history_refresh.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(session_id = %self.core.id, error = %e, "History refresh task panicked");
            }
        }
    }
}

impl Drop for GenerationSession {
    fn drop(&mut self) {
        self.poller.stop();
    }
}

impl SessionCore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply one poll result. Returns whether the session changed.
    fn apply(&self, event: PollEvent) -> bool {
        let mut inner = self.lock();

        let current = inner.active_id.as_ref() == Some(&event.job_id);
        if event.epoch != inner.epoch || inner.state != SessionState::Polling || !current {
            debug!(
                session_id = %self.id,
                job_id = %event.job_id,
                epoch = event.epoch,
                current_epoch = inner.epoch,
                "Discarding stale poll result"
            );
            return false;
        }

        let job = match event.outcome {
            Ok(job) => job,
            Err(e) => {
                self.fail(
                    &mut inner,
                    SessionError::PollingTransport {
                        detail: e.to_string(),
                    },
                );
                return true;
            }
        };

        if job.id != event.job_id {
            warn!(
                session_id = %self.id,
                job_id = %event.job_id,
                reported = %job.id,
                "Ignoring status payload for a different job"
            );
            return false;
        }

        if let Some(previous) = &inner.active {
            if !previous.status.can_advance_to(job.status) {
                warn!(
                    job_id = %job.id,
                    from = %previous.status,
                    to = %job.status,
                    "Ignoring out-of-order job status"
                );
                return false;
            }
        }

        inner.progress = inner.progress.max(job.progress.min(100));

        match job.status {
            JobStatus::Pending | JobStatus::Processing => {
                debug!(job_id = %job.id, progress = inner.progress, "Generation in progress");
                inner.active = Some(job);
                self.publish(&inner);
            }
            JobStatus::Completed => {
                info!(session_id = %self.id, job_id = %job.id, "Mosaic generation completed");
                metrics::counter!("mosaic_jobs_completed_total").increment(1);
                inner.active = Some(job);
                self.transition(&mut inner, SessionState::Completed);
                inner.history_refresh = Some(self.spawn_history_refresh());
            }
            JobStatus::Failed => {
                let message = failure_message(&job);
                info!(
                    session_id = %self.id,
                    job_id = %job.id,
                    error = %message,
                    "Mosaic generation failed"
                );
                inner.active = Some(job);
                self.fail(&mut inner, SessionError::GenerationFailure(message));
            }
        }
        true
    }

    fn spawn_history_refresh(&self) -> JoinHandle<()> {
        let history = Arc::clone(&self.history);
        let jobs = Arc::clone(&self.jobs);
        let session_id = self.id;

        tokio::spawn(async move {
            if let Err(e) = history.refresh(jobs.as_ref()).await {
                warn!(%session_id, error = %e, "Failed to refresh mosaic history");
            }
        })
    }

    fn fail(&self, inner: &mut Inner, err: SessionError) {
        metrics::counter!("mosaic_jobs_failed_total").increment(1);
        inner.last_error = Some(err);
        self.transition(inner, SessionState::Failed);
    }

    fn transition(&self, inner: &mut Inner, next: SessionState) {
        if inner.state != next {
            debug!(session_id = %self.id, from = %inner.state, to = %next, "Session transition");
        }
        inner.state = next;
        self.publish(inner);
    }

    fn publish(&self, inner: &Inner) {
        self.observers.send_replace(inner.snapshot());
    }
}

impl PollSink for SessionCore {
    fn deliver(&self, event: PollEvent) -> bool {
        let epoch = event.epoch;
        self.apply(event);
        let inner = self.lock();
        inner.epoch == epoch && inner.state == SessionState::Polling
    }
}

fn failure_message(job: &Job) -> String {
    job.error
        .as_deref()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or(DEFAULT_FAILURE_MESSAGE)
        .to_string()
}
