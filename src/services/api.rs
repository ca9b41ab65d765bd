use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::services::auth::AuthContext;

/// Shared HTTP client for the mosaic backend: base URL plus bearer token.
pub struct ApiClient {
    http: Client,
    base_url: String,
    asset_base_url: String,
    auth: AuthContext,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        asset_base_url: &str,
        auth: AuthContext,
        timeout: Option<Duration>,
    ) -> Result<Self, ServiceError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ServiceError::Http)?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            asset_base_url: asset_base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    /// Absolute URL for an API path such as `/generate/42/status`.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Resolve a stored image or result path against the asset host.
    /// Absolute URLs are returned unchanged.
    pub fn asset_url(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}/{}", self.asset_base_url, path.trim_start_matches('/'))
    }

    pub fn get(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.get(self.url(path)))
    }

    pub fn post(&self, path: &str) -> RequestBuilder {
        self.authorize(self.http.post(self.url(path)))
    }

    /// GET an absolute URL (e.g. a finished mosaic) with the same credentials.
    pub fn get_absolute(&self, url: &str) -> RequestBuilder {
        self.authorize(self.http.get(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.auth.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and decode a JSON body, mapping non-2xx responses.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = Self::check(request.send().await?).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ServiceError::Decode)
    }

    /// Send a request and return the raw body bytes.
    pub async fn send_bytes(&self, request: RequestBuilder) -> Result<Vec<u8>, ServiceError> {
        let response = Self::check(request.send().await?).await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn check(response: Response) -> Result<Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED {
            return Err(ServiceError::Unauthorized);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|b| b.error)
            .unwrap_or(body);
        Err(ServiceError::Status { status, message })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("Not authorized; the bearer token is missing or expired")]
    Unauthorized,

    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported image file: {0}")]
    UnsupportedImage(String),
}
