//! The remote blob service, which keeps a blob alive while it has holders.

use crate::config::HolderServiceConfig;
use crate::error::{BlobServiceError, BlobServiceResult, ConfigResult};
use reqwest::{Method, RequestBuilder, StatusCode};
use std::future::Future;
use std::time::Duration;
use url::Url;

/// Whether the blob service still stores a blob.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlobExistence {
    /// The blob is stored
    Found,
    /// The blob is gone, or never existed
    NotFound,
}

/// Interface for the blob service.
///
/// All calls are idempotent: establishing a holder twice does not count twice,
/// removing a holder which is already gone succeeds.
#[cfg_attr(any(test, feature = "test_utils"), mockall::automock)]
#[async_trait::async_trait]
pub trait BlobService: Send + Sync {
    /// Register `holder` against the blob.
    async fn establish_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()>;

    /// Deregister `holder` from the blob.
    async fn remove_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()>;

    /// Check whether the blob is still stored.
    async fn blob_exists(&self, blob_hash: &str) -> BlobServiceResult<BlobExistence>;
}

/// Run a blob service call, failing with [`BlobServiceError::Timeout`] if it
/// takes longer than `timeout`.
pub async fn with_timeout<T>(
    timeout: Duration,
    call: impl Future<Output = BlobServiceResult<T>>,
) -> BlobServiceResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| BlobServiceError::Timeout(timeout))?
}

#[derive(serde::Serialize)]
struct AssignHolderRequest<'a> {
    holder: &'a str,
    blob_hash: &'a str,
}

#[derive(serde::Serialize)]
struct RemoveHolderRequest<'a> {
    holder: &'a str,
    blob_hash: &'a str,
    instant_delete: bool,
}

/// An HTTP client for the blob service.
#[derive(Clone)]
pub struct HttpBlobService {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl std::fmt::Debug for HttpBlobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBlobService")
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpBlobService {
    /// Constructor
    pub fn new(base_url: Url, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token,
        }
    }

    /// Build a client from the service configuration.
    pub fn from_config(config: &HolderServiceConfig) -> ConfigResult<Self> {
        Ok(Self::new(
            config.blob_service_url()?,
            config.auth_token.clone(),
        ))
    }

    fn url(&self, segments: &[&str]) -> BlobServiceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                BlobServiceError::Other(format!("Blob service URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait::async_trait]
impl BlobService for HttpBlobService {
    async fn establish_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()> {
        tracing::debug!(%blob_hash, %holder, "Assign holder request");
        let response = self
            .request(Method::POST, self.url(&["blob"])?)
            .json(&AssignHolderRequest { holder, blob_hash })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match handle_http_error(status) {
            BlobServiceError::AlreadyExists => {
                tracing::debug!(%blob_hash, %holder, "Holder already exists");
                Ok(())
            }
            e => Err(e),
        }
    }

    async fn remove_holder(&self, blob_hash: &str, holder: &str) -> BlobServiceResult<()> {
        tracing::debug!(%blob_hash, %holder, "Revoke holder request");
        let response = self
            .request(Method::DELETE, self.url(&["blob"])?)
            .json(&RemoveHolderRequest {
                holder,
                blob_hash,
                instant_delete: false,
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        match handle_http_error(status) {
            BlobServiceError::NotFound => {
                tracing::debug!(%blob_hash, %holder, "Holder already gone");
                Ok(())
            }
            e => Err(e),
        }
    }

    async fn blob_exists(&self, blob_hash: &str) -> BlobServiceResult<BlobExistence> {
        tracing::debug!(%blob_hash, "Blob exists request");
        let response = self
            .request(Method::HEAD, self.url(&["blob", blob_hash])?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(BlobExistence::Found);
        }
        match handle_http_error(status) {
            BlobServiceError::NotFound => Ok(BlobExistence::NotFound),
            e => Err(e),
        }
    }
}

/// Map a non-success status to the error it stands for.
pub fn handle_http_error(status: StatusCode) -> BlobServiceError {
    match status {
        StatusCode::BAD_REQUEST => BlobServiceError::InvalidArguments,
        StatusCode::NOT_FOUND => BlobServiceError::NotFound,
        StatusCode::CONFLICT => BlobServiceError::AlreadyExists,
        code if code.is_server_error() => BlobServiceError::ServerError,
        code => BlobServiceError::UnexpectedHttpStatus(code.as_u16()),
    }
}
