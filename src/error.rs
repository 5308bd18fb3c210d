//! Error handling and JSON error responses for the gateway
//!
//! Every failure a handler can hit maps to exactly one [`GatewayError`], and
//! each error renders as exactly one JSON HTTP response. Nothing propagates
//! past the handler boundary.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// What a failed upstream call left behind: the HTTP status when the
/// upstream answered at all, plus a `details` value relayed to the caller.
#[derive(Debug, Clone)]
pub struct UpstreamFailure {
    /// Status the upstream responded with, `None` for transport failures
    pub status: Option<StatusCode>,
    /// Upstream error body (JSON when parseable, text otherwise) or a
    /// readable message. Never blank.
    pub details: Value,
}

impl UpstreamFailure {
    /// Transport-level failure (connect error, timeout, closed socket)
    pub fn transport(err: &reqwest::Error) -> Self {
        Self {
            status: None,
            details: Value::String(err.to_string()),
        }
    }

    /// Failure response from the upstream: its status plus its body.
    /// JSON bodies are relayed structurally, text bodies as trimmed strings,
    /// and an empty body falls back to a readable message. The status comes
    /// from the client side of the gateway, so it is converted to the server
    /// side's status type here.
    pub fn from_parts(status: reqwest::StatusCode, body: &[u8]) -> Self {
        let details = match serde_json::from_slice::<Value>(body) {
            Ok(value) => value,
            Err(_) => {
                let text = String::from_utf8_lossy(body);
                let text = text.trim();
                if text.is_empty() {
                    Value::String(format!(
                        "Upstream request failed with status {}",
                        status.as_u16()
                    ))
                } else {
                    Value::String(text.to_string())
                }
            }
        };
        Self {
            status: StatusCode::from_u16(status.as_u16()).ok(),
            details,
        }
    }
}

/// Errors a gateway request can end in
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Missing client key header, or a key outside the allow-set
    #[error("invalid or missing client key")]
    Unauthorized,
    /// ADF body absent, not XML text, or blank
    #[error("invalid or missing ADF XML payload")]
    InvalidAdfPayload,
    /// Inbound body exceeded the configured cap
    #[error("request body exceeds the configured limit")]
    PayloadTooLarge,
    /// Inventory resolve step answered without a Location header
    #[error("presigned URL not found")]
    PresignedUrlNotFound,
    /// Inventory resolve or download step failed
    #[error("inventory fetch failed")]
    InventoryFetchFailed(UpstreamFailure),
    /// ADF ingestion upstream failed
    #[error("ADF forward failed")]
    AdfForwardFailed(UpstreamFailure),
}

impl GatewayError {
    /// Get the HTTP status code for this error. Upstream failures echo the
    /// upstream's status when it answered, 500 otherwise.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::FORBIDDEN,
            GatewayError::InvalidAdfPayload => StatusCode::BAD_REQUEST,
            GatewayError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::PresignedUrlNotFound => StatusCode::NOT_FOUND,
            GatewayError::InventoryFetchFailed(failure)
            | GatewayError::AdfForwardFailed(failure) => {
                failure.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// Get the error code as a string for the X-Gateway-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "UNAUTHORIZED",
            GatewayError::InvalidAdfPayload => "INVALID_ADF_PAYLOAD",
            GatewayError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            GatewayError::PresignedUrlNotFound => "PRESIGNED_URL_NOT_FOUND",
            GatewayError::InventoryFetchFailed(_) => "INVENTORY_FETCH_FAILED",
            GatewayError::AdfForwardFailed(_) => "ADF_FORWARD_FAILED",
        }
    }

    /// The fixed, caller-facing `error` string for this failure
    pub fn message(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "Unauthorized request: Invalid or missing client key",
            GatewayError::InvalidAdfPayload => "Invalid or missing ADF XML data.",
            GatewayError::PayloadTooLarge => "ADF XML payload exceeds the size limit.",
            GatewayError::PresignedUrlNotFound => "Presigned URL not found.",
            GatewayError::InventoryFetchFailed(_) => "Failed to fetch inventory data.",
            GatewayError::AdfForwardFailed(_) => "Failed to forward ADF XML.",
        }
    }

    /// Render this error as its one and only HTTP response
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let status = self.status_code();
        let code = self.as_header_value();
        let message = self.message();
        let details = match self {
            GatewayError::InventoryFetchFailed(failure)
            | GatewayError::AdfForwardFailed(failure) => Some(failure.details),
            _ => None,
        };
        let body = ErrorBody {
            error: message,
            details,
        }
        .to_json();

        Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("X-Gateway-Error", code)
            .body(Full::new(Bytes::from(body)))
            .expect("valid response with StatusCode enum and static headers")
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Fixed human-readable error string
    pub error: &'static str,
    /// Upstream error body or message, present on upstream failures only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    /// Convert to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, self.error.replace('\"', "\\\"")))
    }
}
