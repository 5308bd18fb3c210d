//! Inventory retrieval through the partner's presigned-URL flow
//!
//! The partner API never serves inventory documents directly. A HEAD request
//! against the dealership endpoint answers with a redirect whose `Location`
//! header points at a short-lived presigned document URL; the document is
//! then downloaded with a plain GET. Both steps happen fresh on every
//! request, nothing is cached.

use anyhow::Context;
use hyper::body::Bytes;
use tracing::{debug, error};

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, UpstreamFailure};

/// Path under the partner base URL that answers dealership inventory lookups
const DEALERSHIP_INVENTORY_PATH: &str = "/integration/iep/dealership_inventory";

/// Outcome of the resolve step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresignedResolution {
    /// Presigned document URL taken from the Location header
    Located(String),
    /// Upstream accepted the lookup but sent no Location header
    Missing,
}

/// Two-step inventory fetcher
pub struct InventoryProxy {
    /// Client for the resolve call. Redirects stay unfollowed here: the
    /// Location header is the payload, not a hop to take.
    resolve_client: reqwest::Client,
    /// Client for the presigned download, following redirects normally
    download_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl InventoryProxy {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut resolve = reqwest::Client::builder().redirect(reqwest::redirect::Policy::none());
        let mut download = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            resolve = resolve.timeout(timeout);
            download = download.timeout(timeout);
        }

        Ok(Self {
            resolve_client: resolve
                .build()
                .context("Failed to build inventory resolve client")?,
            download_client: download
                .build()
                .context("Failed to build inventory download client")?,
            base_url: config.inventory_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    /// Fetch the inventory document for one dealership: resolve the
    /// presigned location, then download it. Returns the document bytes
    /// exactly as the upstream served them.
    pub async fn fetch(&self, dealership_id: &str) -> Result<Bytes, GatewayError> {
        let location = match self.resolve(dealership_id).await? {
            PresignedResolution::Located(url) => url,
            PresignedResolution::Missing => return Err(GatewayError::PresignedUrlNotFound),
        };
        self.download(&location).await
    }

    /// Resolve step: authenticated HEAD against the dealership endpoint,
    /// reading the Location header out of the (unfollowed) redirect.
    async fn resolve(&self, dealership_id: &str) -> Result<PresignedResolution, GatewayError> {
        let url = self.resolve_url(dealership_id);
        debug!(url = %url, "Resolving presigned inventory location");

        let response = self
            .resolve_client
            .head(&url)
            .header("Authorization", format!("Basic {}", self.api_key))
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Inventory resolve request failed");
                GatewayError::InventoryFetchFailed(UpstreamFailure::transport(&e))
            })?;

        let status = response.status();
        // The lookup answers with a redirect, so [200, 400) counts as success
        if !(status.is_success() || status.is_redirection()) {
            let body = response.bytes().await.unwrap_or_default();
            error!(status = %status, "Inventory resolve returned an error status");
            return Err(GatewayError::InventoryFetchFailed(
                UpstreamFailure::from_parts(status, &body),
            ));
        }

        match response
            .headers()
            .get("location")
            .and_then(|v| v.to_str().ok())
        {
            Some(location) => Ok(PresignedResolution::Located(location.to_string())),
            None => Ok(PresignedResolution::Missing),
        }
    }

    /// Download step: plain GET on the presigned URL. The URL is
    /// self-authorizing, so no Authorization header is attached.
    async fn download(&self, location: &str) -> Result<Bytes, GatewayError> {
        debug!("Downloading presigned inventory document");

        let response = self
            .download_client
            .get(location)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Inventory download request failed");
                GatewayError::InventoryFetchFailed(UpstreamFailure::transport(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            error!(status = %status, "Inventory download returned an error status");
            return Err(GatewayError::InventoryFetchFailed(
                UpstreamFailure::from_parts(status, &body),
            ));
        }

        let body = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read inventory document body");
            GatewayError::InventoryFetchFailed(UpstreamFailure::transport(&e))
        })?;

        // The document must be JSON; the caller then receives the original
        // bytes untouched rather than a re-serialization
        if serde_json::from_slice::<serde_json::Value>(&body).is_err() {
            error!("Inventory document is not valid JSON");
            return Err(GatewayError::InventoryFetchFailed(UpstreamFailure {
                status: None,
                details: serde_json::Value::String(
                    "Inventory document is not valid JSON".to_string(),
                ),
            }));
        }

        debug!(bytes = body.len(), "Inventory document downloaded");
        Ok(body)
    }

    fn resolve_url(&self, dealership_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url, DEALERSHIP_INVENTORY_PATH, dealership_id
        )
    }
}
