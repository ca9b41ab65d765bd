use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

use crate::models::image::ImageRef;
use crate::models::project::ProjectId;
use crate::services::api::{ApiClient, ServiceError};

/// An image file ready to be sent to the image store.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime: &'static str,
}

impl ImageUpload {
    /// Wrap in-memory bytes, rejecting anything that is not a known image format.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Result<Self, ServiceError> {
        let filename = filename.into();
        let format = image::guess_format(&bytes)
            .map_err(|_| ServiceError::UnsupportedImage(filename.clone()))?;
        let mime = format.to_mime_type();
        Ok(Self {
            filename,
            bytes,
            mime,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ServiceError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();
        Self::new(filename, bytes)
    }

    fn into_part(self) -> Result<Part, ServiceError> {
        Part::bytes(self.bytes)
            .file_name(self.filename)
            .mime_str(self.mime)
            .map_err(ServiceError::Http)
    }
}

/// Storage for main and tile images.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload_main(
        &self,
        upload: ImageUpload,
        project_id: Option<ProjectId>,
    ) -> Result<ImageRef, ServiceError>;

    async fn upload_tiles(
        &self,
        uploads: Vec<ImageUpload>,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<ImageRef>, ServiceError>;
}

#[derive(Deserialize)]
struct TileUploadResponse {
    images: Vec<ImageRef>,
}

/// Image store reached over the backend REST API (multipart uploads).
pub struct HttpImageStore {
    api: Arc<ApiClient>,
}

impl HttpImageStore {
    pub fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }

    /// Fetch a stored artifact such as a finished mosaic.
    pub async fn download(&self, path_or_url: &str) -> Result<Vec<u8>, ServiceError> {
        let url = self.api.asset_url(path_or_url);
        self.api.send_bytes(self.api.get_absolute(&url)).await
    }
}

fn with_project(form: Form, project_id: Option<ProjectId>) -> Form {
    match project_id {
        Some(id) => form.text("project_id", id.to_string()),
        None => form,
    }
}

#[async_trait]
impl ImageStore for HttpImageStore {
    async fn upload_main(
        &self,
        upload: ImageUpload,
        project_id: Option<ProjectId>,
    ) -> Result<ImageRef, ServiceError> {
        let filename = upload.filename.clone();
        let form = with_project(Form::new().part("image", upload.into_part()?), project_id);

        let image: ImageRef = self
            .api
            .send_json(self.api.post("/images/main").multipart(form))
            .await?;

        tracing::info!(image_id = %image.id, filename = %filename, "Main image uploaded");
        Ok(image)
    }

    async fn upload_tiles(
        &self,
        uploads: Vec<ImageUpload>,
        project_id: Option<ProjectId>,
    ) -> Result<Vec<ImageRef>, ServiceError> {
        let count = uploads.len();
        let mut form = Form::new();
        for upload in uploads {
            form = form.part("images[]", upload.into_part()?);
        }
        let form = with_project(form, project_id);

        let response: TileUploadResponse = self
            .api
            .send_json(self.api.post("/images/tiles").multipart(form))
            .await?;

        tracing::info!(
            requested = count,
            stored = response.images.len(),
            "Tile images uploaded"
        );
        Ok(response.images)
    }
}
