// crates/link-locker-server/src/lib.rs
// ============================================================================
// Module: Link Locker Server Library
// Description: HTTP surface for the link locker engine.
// Purpose: Serve offers, dispatch, analytics, gating, postbacks, and webhooks.
// Dependencies: axum, link-locker-config, link-locker-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! The server exposes the link locker engine over HTTP with `axum`. Visitor
//! identity comes from proxy headers and an optional HTTP geolocation lookup;
//! every request and every crediting decision is written to an audit sink.
//! Security posture: postback and webhook endpoints are public and all of
//! their inputs are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod context;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod server;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditEvent;
pub use audit::AuditKind;
pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::MemoryAuditSink;
pub use audit::NoopAuditSink;
pub use audit::StderrAuditSink;
pub use context::ClientInfo;
pub use error::ApiError;
pub use geo::HttpGeoResolver;
pub use server::AppState;
pub use server::LockerServer;
pub use server::ServerError;
pub use server::build_router;
pub use server::build_store;
pub use server::serve_listener;
