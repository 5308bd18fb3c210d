//! ADF-XML lead forwarding
//!
//! Leads arrive as raw ADF XML and leave as raw ADF XML. The gateway
//! validates just enough to refuse junk (XML content type, UTF-8 text,
//! non-blank) and otherwise passes the payload through untouched, mirroring
//! the ingestion endpoint's acknowledgement back to the caller.

use anyhow::Context;
use hyper::body::Bytes;
use hyper::StatusCode;
use tracing::{debug, error};

use crate::config::UpstreamConfig;
use crate::error::{GatewayError, UpstreamFailure};

/// Upstream acknowledgement mirrored back to the caller
#[derive(Debug, Clone)]
pub struct AdfAck {
    /// Status the ingestion endpoint answered with (always 2xx)
    pub status: StatusCode,
    /// Upstream Content-Type, when it sent one
    pub content_type: Option<String>,
    /// Raw acknowledgement body
    pub body: Bytes,
}

/// Check an inbound lead payload before any outbound call happens.
/// The content type must be `application/xml` (parameters tolerated), the
/// body must be UTF-8 text and must not be blank.
pub fn validate_adf_payload(content_type: Option<&str>, body: &[u8]) -> Result<(), GatewayError> {
    let Some(content_type) = content_type else {
        return Err(GatewayError::InvalidAdfPayload);
    };
    let mime = content_type.split(';').next().unwrap_or("").trim();
    if !mime.eq_ignore_ascii_case("application/xml") {
        return Err(GatewayError::InvalidAdfPayload);
    }

    let Ok(text) = std::str::from_utf8(body) else {
        return Err(GatewayError::InvalidAdfPayload);
    };
    if text.trim().is_empty() {
        return Err(GatewayError::InvalidAdfPayload);
    }

    Ok(())
}

/// Forwards validated ADF XML to the ingestion endpoint
pub struct AdfForwarder {
    client: reqwest::Client,
    ingest_url: String,
}

impl AdfForwarder {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().context("Failed to build ADF forward client")?,
            ingest_url: config.adf_ingest_url.clone(),
        })
    }

    /// Forward a validated payload. A 2xx upstream answer becomes an
    /// [`AdfAck`]; anything else maps to an error carrying the upstream's
    /// status and body.
    pub async fn forward(&self, xml: Bytes) -> Result<AdfAck, GatewayError> {
        debug!(bytes = xml.len(), "Forwarding ADF XML to ingestion endpoint");

        let response = self
            .client
            .post(&self.ingest_url)
            .header("Content-Type", "application/xml")
            .header("Accept", "application/xml")
            .body(xml)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "ADF forward request failed");
                GatewayError::AdfForwardFailed(UpstreamFailure::transport(&e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            error!(status = %status, "ADF ingestion endpoint returned an error status");
            return Err(GatewayError::AdfForwardFailed(UpstreamFailure::from_parts(
                status, &body,
            )));
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let ack_status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);

        let body = response.bytes().await.map_err(|e| {
            error!(error = %e, "Failed to read ADF acknowledgement body");
            GatewayError::AdfForwardFailed(UpstreamFailure::transport(&e))
        })?;

        debug!(status = %status, "ADF XML accepted upstream");
        Ok(AdfAck {
            status: ack_status,
            content_type,
            body,
        })
    }
}
