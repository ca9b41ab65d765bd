use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::AppConfig;
use crate::models::project::ProjectId;
use crate::services::{
    api::{ApiClient, ServiceError},
    auth::AuthContext,
    images::HttpImageStore,
    jobs::{HttpJobService, MosaicJobService},
    projects::{HttpProjectStore, ProjectStore},
};
use crate::tracker::{GenerationSession, JobHistoryCache};

/// Shared client state: collaborators plus one history cache per project.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<ApiClient>,
    pub jobs: Arc<dyn MosaicJobService>,
    pub images: Arc<HttpImageStore>,
    pub projects: Arc<dyn ProjectStore>,
    poll_interval: Duration,
    histories: Arc<Mutex<HashMap<ProjectId, Arc<JobHistoryCache>>>>,
}

impl AppState {
    pub fn new(
        api: Arc<ApiClient>,
        jobs: Arc<dyn MosaicJobService>,
        images: Arc<HttpImageStore>,
        projects: Arc<dyn ProjectStore>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            api,
            jobs,
            images,
            projects,
            poll_interval,
            histories: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build HTTP-backed collaborators from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ServiceError> {
        let auth = match &config.auth_token {
            Some(token) => AuthContext::with_token(token.as_str()),
            None => AuthContext::anonymous(),
        };
        let api = Arc::new(ApiClient::new(
            &config.api_base_url,
            &config.asset_base_url,
            auth,
            config.request_timeout(),
        )?);

        Ok(Self::new(
            Arc::clone(&api),
            Arc::new(HttpJobService::new(Arc::clone(&api))),
            Arc::new(HttpImageStore::new(Arc::clone(&api))),
            Arc::new(HttpProjectStore::new(Arc::clone(&api))),
            config.poll_interval(),
        ))
    }

    /// History cache for a project, shared by every session and view of it.
    pub fn history_for(&self, project_id: ProjectId) -> Arc<JobHistoryCache> {
        let mut histories = self.histories.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            histories
                .entry(project_id)
                .or_insert_with(|| Arc::new(JobHistoryCache::new(project_id))),
        )
    }

    /// Open a generation session for an existing project.
    pub async fn open_session(
        &self,
        project_id: ProjectId,
    ) -> Result<GenerationSession, ServiceError> {
        let session = GenerationSession::open(
            self.projects.as_ref(),
            Arc::clone(&self.jobs),
            self.history_for(project_id),
        )
        .await?;
        Ok(session.with_poll_interval(self.poll_interval))
    }
}
