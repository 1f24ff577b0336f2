// crates/link-locker-server/src/context.rs
// ============================================================================
// Module: Link Locker Request Context
// Description: Client IP and user-agent extraction for visitor requests.
// Purpose: Derive the visitor identity inputs from HTTP request parts.
// Dependencies: axum, link-locker-core
// ============================================================================

//! ## Overview
//! The visitor IP is the first `X-Forwarded-For` hop, then `X-Real-IP`, then
//! the socket peer. Visitor contexts are built off the async runtime because
//! geolocation is a blocking lookup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::net::IpAddr;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::header::USER_AGENT;
use axum::http::request::Parts;
use link_locker_core::GeoInfo;
use link_locker_core::GeoResolver;
use link_locker_core::VisitorContext;
use link_locker_core::runtime::resolve_geo_or_default;

use crate::audit::AuditEvent;
use crate::audit::AuditKind;
use crate::audit::AuditSink;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Forwarded-for header set by reverse proxies.
const FORWARDED_FOR: &str = "x-forwarded-for";
/// Single-address header set by some proxies.
const REAL_IP: &str = "x-real-ip";
/// Placeholder when no client address is known.
const UNKNOWN_IP: &str = "unknown";

// ============================================================================
// SECTION: Client Info
// ============================================================================

/// Request-derived visitor identity inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Resolved client IP.
    pub ip_address: String,
    /// Raw user agent, empty when absent.
    pub user_agent: String,
}

impl ClientInfo {
    /// Extracts client info from headers and the optional socket peer.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, peer: Option<IpAddr>) -> Self {
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Self {
            ip_address: client_ip(headers, peer),
            user_agent,
        }
    }

    /// Resolves the full visitor context, auditing geolocation fallbacks.
    ///
    /// Blocks on the geolocation lookup.
    #[must_use]
    pub fn resolve_visitor(
        &self,
        geo: &dyn GeoResolver,
        fallback: &GeoInfo,
        audit: &dyn AuditSink,
    ) -> VisitorContext {
        let (info, error) = resolve_geo_or_default(geo, &self.ip_address, fallback);
        if let Some(error) = error {
            audit.record(&AuditEvent::new(AuditKind::GeoFallback {
                ip_address: self.ip_address.clone(),
                error: error.to_string(),
            }));
        }
        VisitorContext::resolve(self.ip_address.clone(), &self.user_agent, info)
    }
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
        Ok(Self::from_headers(&parts.headers, peer))
    }
}

/// Resolves the client IP from proxy headers, then the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> String {
    let forwarded = headers
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }
    let real_ip = headers
        .get(REAL_IP)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }
    peer.map_or_else(|| UNKNOWN_IP.to_string(), |ip| ip.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
