// crates/link-locker-server/src/server.rs
// ============================================================================
// Module: Link Locker HTTP Server
// Description: Router assembly, shared state, and server lifecycle.
// Purpose: Expose the link locker engine over HTTP.
// Dependencies: axum, link-locker-config, link-locker-core, tokio
// ============================================================================

//! ## Overview
//! [`LockerServer`] wires configuration into a store, a geolocation resolver,
//! an audit sink, and a [`LockerEngine`], then serves the routes built by
//! [`build_router`]. Engine calls are synchronous and run on the blocking pool
//! under the configured request timeout. Security posture: every request body
//! and query parameter is untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::MatchedPath;
use axum::extract::Request;
use axum::extract::State;
use axum::middleware;
use axum::middleware::Next;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use link_locker_config::GeoMode;
use link_locker_config::LinkLockerConfig;
use link_locker_config::ServerAuditConfig;
use link_locker_config::StoreType;
use link_locker_core::AttributionOutcome;
use link_locker_core::EngineError;
use link_locker_core::GeoResolver;
use link_locker_core::InMemoryLockerStore;
use link_locker_core::LockerEngine;
use link_locker_core::SharedLockerStore;
use link_locker_core::StaticGeoResolver;
use link_locker_core::SystemClock;
use link_locker_core::VisitorContext;
use link_locker_store_sqlite::SqliteLockerStore;
use tokio::net::TcpListener;

use crate::audit::AuditEvent;
use crate::audit::AuditKind;
use crate::audit::AuditSink;
use crate::audit::FileAuditSink;
use crate::audit::NoopAuditSink;
use crate::audit::StderrAuditSink;
use crate::context::ClientInfo;
use crate::context::client_ip;
use crate::error::ApiError;
use crate::geo::HttpGeoResolver;
use crate::handlers;

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    /// Link locker engine.
    engine: LockerEngine,
    /// Visitor geolocation.
    geo: Arc<dyn GeoResolver>,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Upper bound on one handler's blocking work.
    request_timeout: Duration,
}

impl AppState {
    /// Creates handler state.
    #[must_use]
    pub fn new(
        engine: LockerEngine,
        geo: Arc<dyn GeoResolver>,
        audit: Arc<dyn AuditSink>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            engine,
            geo,
            audit,
            request_timeout,
        }
    }

    /// Returns the engine.
    #[must_use]
    pub const fn engine(&self) -> &LockerEngine {
        &self.engine
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn audit(&self) -> &dyn AuditSink {
        self.audit.as_ref()
    }

    /// Resolves the visitor context for a request. Blocks on geolocation.
    #[must_use]
    pub fn visitor(&self, client: &ClientInfo) -> VisitorContext {
        let fallback = self.engine.config().fallback_geo();
        client.resolve_visitor(self.geo.as_ref(), &fallback, self.audit.as_ref())
    }

    /// Records the crediting events for an attribution outcome.
    pub fn audit_credit(&self, outcome: &AttributionOutcome) {
        for event in AuditEvent::credit_events(outcome) {
            self.audit.record(&event);
        }
    }

    /// Records an attribution failure caught at the handler boundary.
    ///
    /// Only store failures are recorded; client errors are answered, not
    /// audited as failures.
    pub fn audit_failure(
        &self,
        channel: &'static str,
        ids: FailureContext,
        error: &EngineError,
    ) {
        if !matches!(error, EngineError::Store(_)) {
            return;
        }
        self.audit.record(&AuditEvent::new(AuditKind::AttributionFailed {
            channel,
            locker_id: ids.locker_id,
            task_id: ids.task_id,
            click_id: ids.click_id,
            error: error.to_string(),
        }));
    }

    /// Runs synchronous engine work on the blocking pool under the request
    /// timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Timeout`] when the timeout elapses, the work's
    /// own error, or [`ApiError::Internal`] when the worker panics.
    pub async fn run_blocking<T, F>(&self, work: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Self) -> Result<T, ApiError> + Send + 'static,
    {
        let state = self.clone();
        let task = tokio::task::spawn_blocking(move || work(&state));
        match tokio::time::timeout(self.request_timeout, task).await {
            Err(_) => Err(ApiError::Timeout),
            Ok(Err(err)) => Err(ApiError::Internal(err.to_string())),
            Ok(Ok(result)) => result,
        }
    }
}

/// Identifiers known when an attribution attempt failed.
#[derive(Debug, Clone, Default)]
pub struct FailureContext {
    /// Locker, when known.
    pub locker_id: Option<String>,
    /// Task, when known.
    pub task_id: Option<String>,
    /// Click or sub id, when known.
    pub click_id: Option<String>,
}

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the HTTP router.
pub fn build_router(state: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/lockers/{locker_id}/tasks", get(handlers::list_offers))
        .route("/lockers/{locker_id}/tasks/{task_id}/dispatch", post(handlers::dispatch_task))
        .route("/analytics", post(handlers::record_analytics))
        .route(
            "/ip-tracking",
            get(handlers::cooldown_status).post(handlers::check_eligibility),
        )
        .route("/postback", get(handlers::receive_postback).post(handlers::receive_postback))
        .route(
            "/tasks/webhooks/{token}",
            get(handlers::receive_webhook).post(handlers::receive_webhook),
        )
        .route("/rates/bulk", post(handlers::import_rates))
        .route("/targeting/overrides", put(handlers::save_overrides))
        .route("/publishers/{publisher_id}/ledger", get(handlers::ledger_summary))
        .route_layer(middleware::from_fn_with_state(state.clone(), audit_requests))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

/// Records one `http_request` audit event per matched request.
async fn audit_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path().to_string(), |path| path.as_str().to_string());
    let peer = request.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    let client_ip = client_ip(request.headers(), peer);
    let response = next.run(request).await;
    state.audit.record(&AuditEvent::new(AuditKind::HttpRequest {
        method,
        route,
        status: response.status().as_u16(),
        client_ip,
        latency_ms: started.elapsed().as_millis(),
    }));
    response
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// Link locker HTTP server.
pub struct LockerServer {
    /// Validated configuration.
    config: LinkLockerConfig,
    /// Handler state.
    state: AppState,
}

impl LockerServer {
    /// Builds a server from configuration.
    ///
    /// Call outside an async context: the HTTP geolocation client is blocking.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation or initialization fails.
    pub fn from_config(mut config: LinkLockerConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let store = build_store(&config)?;
        let geo = build_geo_resolver(&config)?;
        let audit = build_audit_sink(&config.server.audit)?;
        let engine = LockerEngine::new(store, Arc::new(SystemClock), config.engine_config());
        let state = AppState::new(
            engine,
            geo,
            audit,
            Duration::from_millis(config.server.request_timeout_ms),
        );
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the handler state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the configured router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.config.server.max_body_bytes)
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
        serve_listener(listener, self.router()).await
    }
}

/// Serves a router on an already bound listener.
///
/// # Errors
///
/// Returns [`ServerError::Transport`] when the server fails.
pub async fn serve_listener(listener: TcpListener, router: Router) -> Result<(), ServerError> {
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|_| ServerError::Transport("http server failed".to_string()))
}

/// Builds the store from configuration.
///
/// # Errors
///
/// Returns [`ServerError`] when the configured store cannot be opened.
pub fn build_store(config: &LinkLockerConfig) -> Result<SharedLockerStore, ServerError> {
    let store = match config.store.store_type {
        StoreType::Memory => SharedLockerStore::from_store(InMemoryLockerStore::new()),
        StoreType::Sqlite => {
            let sqlite_config = config
                .store
                .sqlite_config()
                .ok_or_else(|| ServerError::Config("sqlite store requires path".to_string()))?;
            let store = SqliteLockerStore::new(sqlite_config)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            SharedLockerStore::from_store(store)
        }
    };
    Ok(store)
}

/// Builds the geolocation resolver from configuration.
fn build_geo_resolver(config: &LinkLockerConfig) -> Result<Arc<dyn GeoResolver>, ServerError> {
    match config.geo.mode {
        GeoMode::Disabled => Ok(Arc::new(StaticGeoResolver::new(config.geo.fallback()))),
        GeoMode::Http => {
            let resolver = HttpGeoResolver::from_config(&config.geo)
                .map_err(|err| ServerError::Init(err.to_string()))?;
            Ok(Arc::new(resolver))
        }
    }
}

/// Builds the audit sink from configuration.
fn build_audit_sink(config: &ServerAuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    if !config.enabled {
        return Ok(Arc::new(NoopAuditSink));
    }
    match &config.path {
        Some(path) => {
            let sink = FileAuditSink::new(std::path::Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log: {err}")))?;
            Ok(Arc::new(sink))
        }
        None => Ok(Arc::new(StderrAuditSink)),
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
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
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions use unwrap/expect for clarity."
    )]

    use super::*;

    fn config(extra: &str) -> LinkLockerConfig {
        let text = format!("[server]\nbind = \"127.0.0.1:0\"\n{extra}");
        LinkLockerConfig::from_toml_str(&text).unwrap()
    }

    #[test]
    fn memory_config_builds_server() {
        let server = LockerServer::from_config(config("[server.audit]\nenabled = false\n"));
        assert!(server.is_ok());
    }

    #[test]
    fn sqlite_store_opens_at_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locker.db");
        let extra = format!("[store]\ntype = \"sqlite\"\npath = \"{}\"\n", path.display());
        let server = LockerServer::from_config(config(&extra));
        assert!(server.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn audit_file_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let extra = format!("[server.audit]\npath = \"{}\"\n", path.display());
        let server = LockerServer::from_config(config(&extra));
        assert!(server.is_ok());
        assert!(path.exists());
    }

    #[test]
    fn missing_bind_is_a_config_error() {
        let mut config = LinkLockerConfig::default();
        config.server.bind = None;
        let err = LockerServer::from_config(config).err().unwrap();
        assert!(matches!(err, ServerError::Config(_)));
    }
}
