use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::models::job::{Job, JobId, SubmittedJob};
use crate::models::project::ProjectId;
use crate::models::settings::{GenerationRequest, MosaicSettings};
use crate::services::api::{ApiClient, ServiceError};

/// The backend that runs mosaic compositing. Opaque beyond these calls.
#[async_trait]
pub trait MosaicJobService: Send + Sync {
    /// Ask for a new mosaic. Returns once the job has an id.
    async fn submit(
        &self,
        project_id: ProjectId,
        request: &GenerationRequest,
    ) -> Result<SubmittedJob, ServiceError>;

    /// Current state of one job.
    async fn get_status(&self, job_id: &JobId) -> Result<Job, ServiceError>;

    /// All jobs recorded for a project, in whatever order the backend sends.
    async fn list_jobs(&self, project_id: ProjectId) -> Result<Vec<Job>, ServiceError>;
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    project_id: ProjectId,
    main_image_id: &'a str,
    tile_image_ids: &'a [String],
    #[serde(flatten)]
    settings: &'a MosaicSettings,
}

/// Job listings arrive either bare or wrapped in `{ "mosaics": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum JobList {
    Bare(Vec<Job>),
    Enveloped { mosaics: Vec<Job> },
}

impl From<JobList> for Vec<Job> {
    fn from(list: JobList) -> Self {
        match list {
            JobList::Bare(jobs) => jobs,
            JobList::Enveloped { mosaics } => mosaics,
        }
    }
}

/// Job service reached over the backend REST API.
pub struct HttpJobService {
    api: Arc<ApiClient>,
}

impl HttpJobService {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl MosaicJobService for HttpJobService {
    async fn submit(
        &self,
        project_id: ProjectId,
        request: &GenerationRequest,
    ) -> Result<SubmittedJob, ServiceError> {
        let body = SubmitBody {
            project_id,
            main_image_id: &request.main_image_id,
            tile_image_ids: &request.tile_image_ids,
            settings: &request.settings,
        };

        let submitted: SubmittedJob = self
            .api
            .send_json(self.api.post("/generate/").json(&body))
            .await?;

        tracing::info!(
            job_id = %submitted.id,
            project_id,
            tiles = request.tile_image_ids.len(),
            "Mosaic generation accepted"
        );
        Ok(submitted)
    }

    async fn get_status(&self, job_id: &JobId) -> Result<Job, ServiceError> {
        self.api
            .send_json(self.api.get(&format!("/generate/{}/status", job_id)))
            .await
    }

    async fn list_jobs(&self, project_id: ProjectId) -> Result<Vec<Job>, ServiceError> {
        let list: JobList = self
            .api
            .send_json(self.api.get(&format!("/projects/{}/mosaics", project_id)))
            .await?;
        Ok(list.into())
    }
}
