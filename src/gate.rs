//! Inbound access control: shared client key check and CORS origin policy
//!
//! Every request passes through the gate before any route logic runs. The
//! key check is a hard gate (403 on failure). The origin check never blocks
//! a request by itself: a disallowed origin simply receives no CORS grant,
//! and the browser enforces the denial.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Response, StatusCode};
use std::collections::HashSet;
use tracing::warn;

use crate::config::AccessConfig;

/// Header carrying the shared client key
pub const CLIENT_KEY_HEADER: &str = "x-client-key";

/// Methods granted to cross-origin callers
const ALLOWED_METHODS: &str = "GET,POST";

/// Request headers granted to cross-origin callers
const ALLOWED_REQUEST_HEADERS: &str = "Content-Type,x-client-key";

/// Outcome of the origin check for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// No Origin header; not a cross-origin browser request
    NotBrowser,
    /// Origin is on the allow-list and is echoed back in the CORS grant
    Allowed(String),
    /// Origin missing from the allow-list (or unreadable); no grant emitted
    Denied,
}

/// Checks the shared client key and decides CORS grants
#[derive(Debug, Clone)]
pub struct AccessGate {
    client_keys: HashSet<String>,
    allowed_origins: Vec<String>,
}

impl AccessGate {
    pub fn new(config: AccessConfig) -> Self {
        Self {
            client_keys: config.client_keys.into_iter().collect(),
            allowed_origins: config.allowed_origins,
        }
    }

    /// True when the request carries a key from the allow-set. An empty
    /// allow-set rejects everything.
    pub fn client_key_is_valid(&self, headers: &HeaderMap) -> bool {
        match headers.get(CLIENT_KEY_HEADER).and_then(|v| v.to_str().ok()) {
            Some(key) => self.client_keys.contains(key),
            None => false,
        }
    }

    /// Classify the request's Origin header against the allow-list
    pub fn check_origin(&self, headers: &HeaderMap) -> OriginDecision {
        let Some(value) = headers.get("origin") else {
            return OriginDecision::NotBrowser;
        };
        let Ok(origin) = value.to_str() else {
            warn!("unreadable Origin header, withholding CORS grant");
            return OriginDecision::Denied;
        };
        if is_origin_allowed(Some(origin), &self.allowed_origins) {
            OriginDecision::Allowed(origin.to_string())
        } else {
            warn!(origin = %origin, "origin not in allow-list, withholding CORS grant");
            OriginDecision::Denied
        }
    }

    /// Answer a CORS preflight. Always 204 with the method/header grants;
    /// the origin grant is included only for allowed origins.
    pub fn preflight_response(&self, decision: &OriginDecision) -> Response<Full<Bytes>> {
        let mut response = Response::builder()
            .status(StatusCode::NO_CONTENT)
            .header("Access-Control-Allow-Methods", ALLOWED_METHODS)
            .header("Access-Control-Allow-Headers", ALLOWED_REQUEST_HEADERS)
            .body(Full::new(Bytes::new()))
            .expect("valid response with StatusCode enum and static headers");
        apply_cors_headers(&mut response, decision);
        response
    }
}

/// Pure origin predicate: absent origin (non-browser caller) is allowed,
/// present origin must match the allow-list exactly.
pub fn is_origin_allowed(origin: Option<&str>, allowlist: &[String]) -> bool {
    match origin {
        None => true,
        Some(origin) => allowlist.iter().any(|allowed| allowed == origin),
    }
}

/// Stamp CORS response headers for this request's origin decision.
/// `Vary: Origin` goes on every gated response; the origin grant echoes the
/// caller's origin and only when allowed. No wildcard is ever emitted.
pub fn apply_cors_headers<B>(response: &mut Response<B>, decision: &OriginDecision) {
    response
        .headers_mut()
        .insert("Vary", HeaderValue::from_static("Origin"));
    if let OriginDecision::Allowed(origin) = decision {
        if let Ok(value) = HeaderValue::from_str(origin) {
            response
                .headers_mut()
                .insert("Access-Control-Allow-Origin", value);
        }
    }
}
