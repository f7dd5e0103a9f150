//! Backend REST API helpers.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};

use crate::auth::AuthContext;
use crate::error::ApiError;
use crate::model::{DataSource, LibrarySnapshot, Raster, StatusReport};

/// Backend calls the import tracker depends on.
#[async_trait]
pub trait ImportBackend: Send + Sync {
    /// Start an import and return its job id.
    async fn create_import(&self, source: &DataSource) -> Result<String, ApiError>;
    async fn job_status(&self, import_id: &str) -> Result<StatusReport, ApiError>;
    async fn fetch_raster(&self, raster_id: &str) -> Result<Raster, ApiError>;
    /// Stop a pending job on the backend.
    async fn delete_job(&self, import_id: &str) -> Result<(), ApiError>;
    /// Permanently add entities to a collection.
    async fn add_to_collection(
        &self,
        collection_id: &str,
        entity_ids: &[String],
    ) -> Result<(), ApiError>;
}

/// Public bootstrap settings served at `GET /env`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct BackendEnv {
    #[serde(rename = "authProvider", default)]
    pub auth_provider: Option<String>,
    #[serde(rename = "authClientId", default)]
    pub auth_client_id: Option<String>,
    #[serde(rename = "authURL", default)]
    pub auth_url: Option<String>,
    #[serde(default)]
    pub tenant: Option<String>,
}

/// Fetch the unauthenticated `/env` bootstrap.
pub async fn fetch_env(http: &Client, base_url: &str) -> Result<BackendEnv, ApiError> {
    let url = format!("{}/env", base_url.trim_end_matches('/'));
    let resp = http.get(url).send().await?;
    let resp = ensure_success(resp).await?;
    Ok(resp.json::<BackendEnv>().await?)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateImportResp {
    import_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CollectionEntitiesReq<'a> {
    entities: &'a [String],
}

/// REST client bound to one backend and one identity provider.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    auth: AuthContext,
}

impl BackendClient {
    pub fn new(http: Client, base_url: &str, auth: AuthContext) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    pub fn auth(&self) -> &AuthContext {
        &self.auth
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the bearer token when the provider has one.
    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        Ok(match self.auth.token().await? {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    pub async fn fetch_library(&self) -> Result<LibrarySnapshot, ApiError> {
        let req = self.authorized(self.http.get(self.url("/api/library"))).await?;
        let resp = ensure_success(req.send().await?).await?;
        Ok(resp.json::<LibrarySnapshot>().await?)
    }

    pub async fn delete_raster(&self, raster_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!("/api/rasters/{}", urlencoding::encode(raster_id)));
        let req = self.authorized(self.http.delete(url)).await?;
        ensure_success(req.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl ImportBackend for BackendClient {
    async fn create_import(&self, source: &DataSource) -> Result<String, ApiError> {
        let req = self
            .authorized(self.http.post(self.url("/api/rasters")).json(source))
            .await?;
        let resp = ensure_success(req.send().await?).await?;
        let body = resp.json::<CreateImportResp>().await?;
        body.import_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiError::Malformed("importId missing".into()))
    }

    async fn job_status(&self, import_id: &str) -> Result<StatusReport, ApiError> {
        let url = self.url(&format!(
            "/api/job_executions/{}",
            urlencoding::encode(import_id)
        ));
        let req = self.authorized(self.http.get(url)).await?;
        let resp = ensure_success(req.send().await?).await?;
        Ok(resp.json::<StatusReport>().await?)
    }

    async fn fetch_raster(&self, raster_id: &str) -> Result<Raster, ApiError> {
        let url = self.url(&format!("/api/rasters/{}", urlencoding::encode(raster_id)));
        let req = self.authorized(self.http.get(url)).await?;
        let resp = ensure_success(req.send().await?).await?;
        Ok(resp.json::<Raster>().await?)
    }

    async fn delete_job(&self, import_id: &str) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/api/job_executions/{}",
            urlencoding::encode(import_id)
        ));
        let req = self.authorized(self.http.delete(url)).await?;
        ensure_success(req.send().await?).await?;
        Ok(())
    }

    async fn add_to_collection(
        &self,
        collection_id: &str,
        entity_ids: &[String],
    ) -> Result<(), ApiError> {
        let url = self.url(&format!(
            "/api/collections/{}/entities",
            urlencoding::encode(collection_id)
        ));
        let body = CollectionEntitiesReq {
            entities: entity_ids,
        };
        let req = self.authorized(self.http.post(url).json(&body)).await?;
        ensure_success(req.send().await?).await?;
        Ok(())
    }
}

/// Convert non-2xx responses into a structured error.
async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}
