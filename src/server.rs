//! Gateway HTTP server: accept loop, routing and response stamping
//!
//! One listener serves HTTP/1.1 and HTTP/2. Every request passes the access
//! gate first (preflights excepted, which need no key), then dispatches to
//! the inventory proxy or ADF forwarder. All shared state is read-only
//! behind an `Arc`; nothing is mutated after startup.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adf::{validate_adf_payload, AdfAck, AdfForwarder};
use crate::config::Config;
use crate::error::GatewayError;
use crate::gate::{apply_cors_headers, AccessGate, OriginDecision};
use crate::inventory::InventoryProxy;

/// Version information for the gateway
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

/// Liveness body served on GET /
const LIVENESS_BODY: &str = "Lotgate Proxy Server is Running...";

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

/// Read-only state shared by every request handler
pub struct GatewayState {
    pub gate: AccessGate,
    pub inventory: InventoryProxy,
    pub adf: AdfForwarder,
    pub max_body_bytes: usize,
}

impl GatewayState {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            gate: AccessGate::new(config.access.clone()),
            inventory: InventoryProxy::new(&config.upstream)?,
            adf: AdfForwarder::new(&config.upstream)?,
            max_body_bytes: config.server.max_body_bytes,
        })
    }
}

/// The gateway's public HTTP server
pub struct GatewayServer {
    bind_addr: SocketAddr,
    state: Arc<GatewayState>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GatewayServer {
    pub fn new(
        bind_addr: SocketAddr,
        state: Arc<GatewayState>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            state,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Gateway listening (HTTP/1.1 and HTTP/2)");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = serve_gateway_connection(stream, addr, state).await {
                                    debug!(addr = %addr, error = %e, "Gateway connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept gateway connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Gateway server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_gateway_connection<S>(
    stream: S,
    _addr: SocketAddr,
    state: Arc<GatewayState>,
) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let state = Arc::clone(&state);
        async move { handle_request(req, state).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Gateway connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<GatewayState>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let request_id = request_id(req.headers());
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!(%method, %path, request_id = %request_id, "Gateway request");

    let origin = state.gate.check_origin(req.headers());

    // Preflights carry no client key; answer them before the key check
    if method == Method::OPTIONS {
        let mut response = state.gate.preflight_response(&origin);
        stamp_request_id(&mut response, &request_id);
        return Ok(response);
    }

    // The key gate is global: even the liveness route sits behind it
    if !state.gate.client_key_is_valid(req.headers()) {
        warn!(%method, %path, request_id = %request_id, "Rejected request with invalid or missing client key");
        return Ok(finish(
            GatewayError::Unauthorized.into_response(),
            &origin,
            &request_id,
        ));
    }

    let response = match (&method, path.as_str()) {
        // Liveness probe
        (&Method::GET, "/") => response(StatusCode::OK, LIVENESS_BODY),

        // Inventory lookup: GET /api/inventory/{dealership_id}
        (&Method::GET, p) if p.starts_with("/api/inventory/") => {
            let id = p.strip_prefix("/api/inventory/").unwrap_or("");
            if id.is_empty() || id.contains('/') {
                response(StatusCode::NOT_FOUND, "not found")
            } else {
                match state.inventory.fetch(id).await {
                    Ok(body) => {
                        info!(dealership = id, request_id = %request_id, "Inventory fetch succeeded");
                        json_response(StatusCode::OK, body)
                    }
                    Err(e) => e.into_response(),
                }
            }
        }

        // Lead forwarding: POST /api/post-data with raw ADF XML
        (&Method::POST, "/api/post-data") => {
            let content_type = req
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let max_body_bytes = state.max_body_bytes;

            match read_body(req.into_body(), max_body_bytes).await {
                Ok(body) => match validate_adf_payload(content_type.as_deref(), &body) {
                    Ok(()) => match state.adf.forward(body).await {
                        Ok(ack) => {
                            info!(status = %ack.status, request_id = %request_id, "ADF XML forwarded");
                            ack_response(ack)
                        }
                        Err(e) => e.into_response(),
                    },
                    Err(e) => {
                        warn!(request_id = %request_id, "Rejected invalid ADF payload");
                        e.into_response()
                    }
                },
                Err(e) => e.into_response(),
            }
        }

        // 404 for everything else
        _ => response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(finish(response, &origin, &request_id))
}

/// Read an inbound body under the configured size cap. Oversized bodies map
/// to 413; any other read failure counts as an invalid payload.
async fn read_body(body: hyper::body::Incoming, limit: usize) -> Result<Bytes, GatewayError> {
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                warn!(limit, "Rejected request body over the size cap");
                Err(GatewayError::PayloadTooLarge)
            } else {
                debug!(error = %e, "Failed to read request body");
                Err(GatewayError::InvalidAdfPayload)
            }
        }
    }
}

/// Mirror an upstream ADF acknowledgement: its status, its content type
/// (application/xml when it sent none) and its body, byte for byte.
fn ack_response(ack: AdfAck) -> Response<Full<Bytes>> {
    let content_type = ack
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/xml"));

    Response::builder()
        .status(ack.status)
        .header("Content-Type", content_type)
        .body(Full::new(ack.body))
        .expect("valid response with StatusCode enum and sanitized header")
}

/// Propagate the caller's x-request-id, or mint a fresh one
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn stamp_request_id(response: &mut Response<Full<Bytes>>, request_id: &str) {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
}

/// Last touch before a response leaves: CORS grant and request id echo
fn finish(
    mut response: Response<Full<Bytes>>,
    origin: &OriginDecision,
    request_id: &str,
) -> Response<Full<Bytes>> {
    apply_cors_headers(&mut response, origin);
    stamp_request_id(&mut response, request_id);
    response
}
