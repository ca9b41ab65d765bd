//! Scripted in-memory collaborators for session tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use mosaic_tracker::models::job::{Job, JobId, JobStatus, SubmittedJob};
use mosaic_tracker::models::project::{ProjectId, ProjectMeta};
use mosaic_tracker::models::settings::GenerationRequest;
use mosaic_tracker::services::api::ServiceError;
use mosaic_tracker::services::jobs::MosaicJobService;
use mosaic_tracker::services::projects::ProjectStore;
use mosaic_tracker::tracker::{SessionSnapshot, SessionState};

/// One scripted answer to a status request.
pub enum Step {
    Status(Job),
    Delayed(Duration, Job),
    TransportError,
}

/// Job service whose answers are scripted per job id.
///
/// When a job's script runs out, the last status returned is repeated.
#[derive(Default)]
pub struct FakeJobService {
    next_ids: Mutex<VecDeque<String>>,
    fail_next_submit: AtomicBool,
    scripts: Mutex<HashMap<JobId, VecDeque<Step>>>,
    last_seen: Mutex<HashMap<JobId, Job>>,
    history: Mutex<Vec<Job>>,
    history_fails: AtomicBool,
    submit_calls: AtomicUsize,
    list_calls: AtomicUsize,
    status_calls: Mutex<HashMap<JobId, usize>>,
    status_in_flight: AtomicUsize,
    max_status_in_flight: AtomicUsize,
    submitted: Mutex<Vec<(ProjectId, GenerationRequest)>>,
}

impl FakeJobService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Ids handed out by the next submissions, in order.
    pub fn with_job_ids(ids: &[&str]) -> Arc<Self> {
        let service = Self::default();
        service
            .next_ids
            .lock()
            .unwrap()
            .extend(ids.iter().map(|id| id.to_string()));
        Arc::new(service)
    }

    pub fn script(&self, job_id: &str, steps: Vec<Step>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(JobId::from(job_id), steps.into());
    }

    pub fn fail_next_submit(&self) {
        self.fail_next_submit.store(true, Ordering::SeqCst);
    }

    pub fn set_history(&self, jobs: Vec<Job>) {
        *self.history.lock().unwrap() = jobs;
    }

    pub fn fail_history(&self) {
        self.history_fails.store(true, Ordering::SeqCst);
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self, job_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(&JobId::from(job_id))
            .copied()
            .unwrap_or(0)
    }

    /// Highest number of status requests ever outstanding at once.
    pub fn max_status_in_flight(&self) -> usize {
        self.max_status_in_flight.load(Ordering::SeqCst)
    }

    pub fn submitted(&self) -> Vec<(ProjectId, GenerationRequest)> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl MosaicJobService for FakeJobService {
    async fn submit(
        &self,
        project_id: ProjectId,
        request: &GenerationRequest,
    ) -> Result<SubmittedJob, ServiceError> {
        let n = self.submit_calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(10)).await;

        if self.fail_next_submit.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::Status {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "a mosaic generation is already in progress for this project"
                    .to_string(),
            });
        }

        self.submitted
            .lock()
            .unwrap()
            .push((project_id, request.clone()));
        let id = self
            .next_ids
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("job-{}", n));

        Ok(SubmittedJob {
            id: JobId::new(id),
            status: JobStatus::Pending,
            created_at: Utc::now(),
        })
    }

    async fn get_status(&self, job_id: &JobId) -> Result<Job, ServiceError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(job_id.clone())
            .or_insert(0) += 1;
        let outstanding = self.status_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_status_in_flight.fetch_max(outstanding, Ordering::SeqCst);

        let result = self.next_status(job_id).await;
        self.status_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn list_jobs(&self, _project_id: ProjectId) -> Result<Vec<Job>, ServiceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.history_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Unauthorized);
        }
        Ok(self.history.lock().unwrap().clone())
    }
}

impl FakeJobService {
    async fn next_status(&self, job_id: &JobId) -> Result<Job, ServiceError> {
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(job_id)
            .and_then(|steps| steps.pop_front());

        let job = match step {
            Some(Step::Status(job)) => job,
            Some(Step::Delayed(delay, job)) => {
                tokio::time::sleep(delay).await;
                job
            }
            Some(Step::TransportError) => {
                return Err(ServiceError::Status {
                    status: StatusCode::BAD_GATEWAY,
                    message: "upstream unavailable".to_string(),
                })
            }
            None => self
                .last_seen
                .lock()
                .unwrap()
                .get(job_id)
                .cloned()
                .unwrap_or_else(|| crate::fixtures::job(job_id.as_str(), JobStatus::Pending, 0)),
        };

        self.last_seen
            .lock()
            .unwrap()
            .insert(job_id.clone(), job.clone());
        Ok(job)
    }
}

pub struct FakeProjectStore {
    pub projects: Vec<ProjectMeta>,
}

#[async_trait]
impl ProjectStore for FakeProjectStore {
    async fn get_project(&self, id: ProjectId) -> Result<ProjectMeta, ServiceError> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| ServiceError::Status {
                status: StatusCode::NOT_FOUND,
                message: "project not found".to_string(),
            })
    }
}

/// Collect the distinct consecutive states a session publishes until it is dropped.
pub fn record_states(mut updates: watch::Receiver<SessionSnapshot>) -> JoinHandle<Vec<SessionState>> {
    tokio::spawn(async move {
        let mut seen = vec![updates.borrow_and_update().state];
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().state;
            if seen.last() != Some(&state) {
                seen.push(state);
            }
        }
        seen
    })
}
