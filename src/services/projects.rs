use async_trait::async_trait;
use std::sync::Arc;

use crate::models::project::{ProjectId, ProjectMeta};
use crate::services::api::{ApiClient, ServiceError};

/// Read access to project records.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, id: ProjectId) -> Result<ProjectMeta, ServiceError>;
}

pub struct HttpProjectStore {
    api: Arc<ApiClient>,
}

impl HttpProjectStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ProjectStore for HttpProjectStore {
    async fn get_project(&self, id: ProjectId) -> Result<ProjectMeta, ServiceError> {
        self.api
            .send_json(self.api.get(&format!("/projects/{}", id)))
            .await
    }
}
