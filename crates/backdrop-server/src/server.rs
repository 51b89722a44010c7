// crates/backdrop-server/src/server.rs
// ============================================================================
// Module: Relay HTTP Server
// Description: axum router exposing relay, preview, catalog, and health.
// Purpose: Map relay results onto HTTP responses under a concurrency cap.
// Dependencies: axum, backdrop-config, backdrop-core, backdrop-fetch, tokio
// ============================================================================

//! ## Overview
//! The server owns one [`RelayService`], the pre-serialized background
//! catalog, and a semaphore sized by `server.max_inflight`. Relay endpoints
//! acquire a permit without waiting; a saturated server answers `503`.
//!
//! Relayed documents are served as `text/html; charset=utf-8` and never carry
//! the headers named by the document's embedding directives. Failures are
//! JSON objects with an `error` field, plus `details` for fetch failures.
//! Security posture: query parameters are untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::Query;
use axum::extract::rejection::QueryRejection;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use backdrop_config::AuditConfig;
use backdrop_config::BackdropConfig;
use backdrop_core::AssembledDocument;
use backdrop_core::SanitizationPolicy;
use backdrop_core::ValidationError;
use backdrop_fetch::FetchError;
use backdrop_fetch::Fetcher;
use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::audit::RelayAuditEvent;
use crate::audit::RelayAuditEventParams;
use crate::audit::RelayAuditSink;
use crate::audit::RelayFileAuditSink;
use crate::audit::RelayNoopAuditSink;
use crate::audit::RelayOutcome;
use crate::audit::RelayStderrAuditSink;
use crate::audit::ServerStartEvent;
use crate::catalog::BackgroundCatalog;
use crate::relay::RelayError;
use crate::relay::RelayService;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Content type of relayed documents.
const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";

/// Content type of the catalog.
const JSON_CONTENT_TYPE: &str = "application/json";

/// Generic error message for transient fetch failures.
const FETCH_FAILED_MESSAGE: &str = "Failed to fetch profile";

// ============================================================================
// SECTION: Server
// ============================================================================

/// Relay HTTP server instance.
pub struct RelayServer {
    /// Validated configuration.
    config: BackdropConfig,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl RelayServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the configuration is invalid, the catalog
    /// fails validation, or the HTTP client cannot be built.
    pub fn from_config(
        mut config: BackdropConfig,
        audit: Arc<dyn RelayAuditSink>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let guard = config.origin.guard().map_err(|err| ServerError::Config(err.to_string()))?;
        let fetcher = Fetcher::new(guard.clone(), config.fetcher_config())
            .map_err(|err| ServerError::Init(err.to_string()))?;
        let catalog = match &config.catalog.path {
            Some(path) => BackgroundCatalog::load(Path::new(path.trim()), config.catalog.max_bytes)
                .map_err(|err| ServerError::Init(err.to_string()))?,
            None => BackgroundCatalog::default(),
        };
        let catalog_json = catalog.to_json().map_err(|err| ServerError::Init(err.to_string()))?;
        let state = Arc::new(ServerState {
            relay: RelayService::new(guard, fetcher, Arc::new(SanitizationPolicy::steam_profile())),
            catalog: Bytes::from(catalog_json),
            catalog_entries: catalog.len(),
            inflight: Semaphore::new(config.server.max_inflight),
            cors_allow_any: config.server.cors_allow_any,
            audit,
        });
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the router with all endpoints mounted.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/fetch", get(handle_fetch))
            .route("/preview", get(handle_preview))
            .route("/steam_backgrounds.json", get(handle_catalog))
            .route("/healthz", get(handle_health))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the listener fails.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|_| ServerError::Transport("http bind failed".to_string()))?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when serving fails.
    pub async fn serve_on(self, listener: TcpListener) -> Result<(), ServerError> {
        let bind = listener
            .local_addr()
            .map_err(|_| ServerError::Transport("listener address unavailable".to_string()))?;
        self.state.audit.record_start(&ServerStartEvent::new(
            bind.to_string(),
            self.state.relay.guard().origin().to_string(),
            self.config.server.max_inflight,
            self.state.catalog_entries,
        ));
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|_| ServerError::Transport("http server failed".to_string()))
    }
}

/// Builds the audit sink named by configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the audit file cannot be opened.
pub fn audit_sink_from_config(
    config: &AuditConfig,
) -> Result<Arc<dyn RelayAuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(RelayNoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = RelayFileAuditSink::new(Path::new(path.trim()))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(RelayStderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Handler State
// ============================================================================

/// Shared state for HTTP handlers.
struct ServerState {
    /// Relay pipeline.
    relay: RelayService,
    /// Catalog JSON served verbatim.
    catalog: Bytes,
    /// Number of catalog entries.
    catalog_entries: usize,
    /// Concurrent relay call permits.
    inflight: Semaphore,
    /// Emit a wildcard CORS header.
    cors_allow_any: bool,
    /// Audit sink for relay events.
    audit: Arc<dyn RelayAuditSink>,
}

impl ServerState {
    /// Applies response headers shared by every endpoint.
    fn finish(&self, mut response: Response) -> Response {
        if self.cors_allow_any {
            response.headers_mut().insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
        }
        response
    }
}

/// Query parameters of the relay endpoints.
#[derive(Debug, Default, Deserialize)]
struct RelayQuery {
    /// Profile URL to relay.
    url: Option<String>,
    /// Background image URL for previews.
    bg: Option<String>,
}

/// JSON error body.
#[derive(Debug, Serialize)]
struct ErrorBody {
    /// Caller-facing message.
    error: String,
    /// Failure description for fetch errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `GET /fetch`.
async fn handle_fetch(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<RelayQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let prepared =
        relay_query(query).and_then(|query| state.relay.prepare_relay(query.url.as_deref()));
    let result = match prepared {
        Ok(request) => with_permit(&state, state.relay.relay_request(&request)).await,
        Err(err) => Err(err),
    };
    respond(&state, "/fetch", peer, started, result)
}

/// Handles `GET /preview`.
async fn handle_preview(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    query: Result<Query<RelayQuery>, QueryRejection>,
) -> Response {
    let started = Instant::now();
    let prepared = relay_query(query).and_then(|query| {
        state.relay.prepare_preview(query.url.as_deref(), query.bg.as_deref())
    });
    let result = match prepared {
        Ok((request, background)) => {
            with_permit(&state, state.relay.preview_request(&request, &background)).await
        }
        Err(err) => Err(err),
    };
    respond(&state, "/preview", peer, started, result)
}

/// Maps an undecodable query string (duplicate or malformed parameters) to a
/// malformed URL so it answers through [`respond`].
fn relay_query(
    query: Result<Query<RelayQuery>, QueryRejection>,
) -> Result<RelayQuery, RelayError> {
    query
        .map(|Query(query)| query)
        .map_err(|_| RelayError::Validation(ValidationError::MalformedUrl))
}

/// Runs validated relay work under an inflight permit.
///
/// Parameters are validated before this point; only valid requests can
/// receive `503`.
async fn with_permit<F>(state: &ServerState, work: F) -> Result<AssembledDocument, RelayError>
where
    F: Future<Output = Result<AssembledDocument, RelayError>>,
{
    let Ok(_permit) = state.inflight.try_acquire() else {
        return Err(RelayError::Busy);
    };
    work.await
}

/// Handles `GET /steam_backgrounds.json`.
async fn handle_catalog(State(state): State<Arc<ServerState>>) -> Response {
    let response =
        ([(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE))], state.catalog.clone())
            .into_response();
    state.finish(response)
}

/// Handles `GET /healthz`.
async fn handle_health(State(state): State<Arc<ServerState>>) -> Response {
    state.finish(Json(serde_json::json!({ "status": "ok" })).into_response())
}

// ============================================================================
// SECTION: Response Mapping
// ============================================================================

/// Converts a relay result into a response and records the audit event.
fn respond(
    state: &ServerState,
    endpoint: &'static str,
    peer: SocketAddr,
    started: Instant,
    result: Result<AssembledDocument, RelayError>,
) -> Response {
    let (response, outcome, error_kind, response_bytes) = match result {
        Ok(assembled) => {
            let bytes = assembled.document.len();
            (html_response(assembled), RelayOutcome::Ok, None, bytes)
        }
        Err(err) => {
            let (status, outcome, body) = error_parts(&err);
            let bytes = serde_json::to_vec(&body).map_or(0, |encoded| encoded.len());
            ((status, Json(body)).into_response(), outcome, Some(err.kind()), bytes)
        }
    };
    state.audit.record(&RelayAuditEvent::new(RelayAuditEventParams {
        endpoint,
        peer_ip: Some(peer.ip().to_string()),
        outcome,
        status: response.status().as_u16(),
        error_kind,
        response_bytes,
        elapsed_ms: started.elapsed().as_millis(),
    }));
    state.finish(response)
}

/// Builds the HTML response for an assembled document.
fn html_response(assembled: AssembledDocument) -> Response {
    let embedding = assembled.embedding;
    let mut response = (
        [(CONTENT_TYPE, HeaderValue::from_static(HTML_CONTENT_TYPE))],
        assembled.document.into_markup(),
    )
        .into_response();
    let headers = response.headers_mut();
    for name in embedding.strip_headers() {
        headers.remove(*name);
    }
    response
}

/// Maps a relay error onto status, audit outcome, and body.
fn error_parts(err: &RelayError) -> (StatusCode, RelayOutcome, ErrorBody) {
    match err {
        RelayError::MissingUrl | RelayError::MissingBackground | RelayError::Validation(_) => (
            StatusCode::BAD_REQUEST,
            RelayOutcome::Rejected,
            ErrorBody {
                error: err.to_string(),
                details: None,
            },
        ),
        RelayError::Fetch(FetchError::UpstreamError {
            status,
            ..
        }) => (
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
            RelayOutcome::UpstreamStatus,
            ErrorBody {
                error: err.to_string(),
                details: None,
            },
        ),
        RelayError::Fetch(fetch) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            RelayOutcome::Failed,
            ErrorBody {
                error: FETCH_FAILED_MESSAGE.to_string(),
                details: Some(fetch.to_string()),
            },
        ),
        RelayError::Busy => (
            StatusCode::SERVICE_UNAVAILABLE,
            RelayOutcome::Busy,
            ErrorBody {
                error: err.to_string(),
                details: None,
            },
        ),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use backdrop_core::ValidationError;
    use backdrop_fetch::FetchError;

    use super::RelayError;
    use super::RelayOutcome;
    use super::error_parts;

    #[test]
    fn upstream_status_is_propagated() {
        let err = RelayError::Fetch(FetchError::UpstreamError {
            status: 404,
            status_text: "Not Found".to_string(),
        });
        let (status, outcome, body) = error_parts(&err);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(outcome, RelayOutcome::UpstreamStatus);
        assert_eq!(body.error, "Upstream returned 404: Not Found");
        assert!(body.details.is_none());
    }

    #[test]
    fn transient_failures_carry_details() {
        let (status, _, body) = error_parts(&RelayError::Fetch(FetchError::FetchTimeout));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Failed to fetch profile");
        assert_eq!(body.details.as_deref(), Some("upstream request timed out"));
    }

    #[test]
    fn validation_failures_are_client_errors() {
        let err = RelayError::Validation(ValidationError::DisallowedHost {
            allowed: "steamcommunity.com".to_string(),
        });
        let (status, outcome, body) = error_parts(&err);
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome, RelayOutcome::Rejected);
        assert_eq!(body.error, "Only steamcommunity.com URLs are allowed");
    }

    #[test]
    fn busy_maps_to_service_unavailable() {
        let (status, outcome, body) = error_parts(&RelayError::Busy);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(outcome, RelayOutcome::Busy);
        assert_eq!(body.error, "server busy");
    }
}
