// crates/link-locker-server/tests/geo_lookup.rs
// ============================================================================
// Module: Geolocation Tests
// Description: HTTP geolocation lookups against a stub and fallback handling.
// Purpose: Validate bounded lookups and the audited default-country fallback.
// Dependencies: axum, link-locker-config, link-locker-core, link-locker-server
// ============================================================================

//! ## Overview
//! A stub lookup service answers per IP so each failure mode is reachable.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use std::sync::Arc;

use axum::Router;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use common::LOCKER;
use common::TestServer;
use common::spawn_router;
use link_locker_config::GeoConfig;
use link_locker_config::GeoMode;
use link_locker_core::EngineConfig;
use link_locker_core::GeoError;
use link_locker_core::GeoInfo;
use link_locker_core::GeoResolver;
use link_locker_core::Tier;
use link_locker_server::HttpGeoResolver;

// ============================================================================
// SECTION: Stub
// ============================================================================

/// Answers lookups by IP: `.1` German VPN, `.2` server error, `.3` oversized,
/// `.4` malformed, `.5` redirect.
async fn lookup(Path(ip): Path<String>) -> Response {
    match ip.as_str() {
        "203.0.113.1" => r#"{"countryCode":"DE","isVpn":true}"#.into_response(),
        "203.0.113.2" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "203.0.113.3" => format!(r#"{{"countryCode":"DE","pad":"{}"}}"#, "x".repeat(4096))
            .into_response(),
        "203.0.113.5" => {
            (StatusCode::FOUND, [("location", "/json/203.0.113.1")]).into_response()
        }
        _ => "not json".into_response(),
    }
}

/// Starts the stub and returns a resolver pointed at it.
fn resolver() -> (HttpGeoResolver, StubGuard) {
    let router = Router::new().route("/json/{ip}", get(lookup));
    let (base_url, shutdown, join) = spawn_router(router);
    let config = GeoConfig {
        mode: GeoMode::Http,
        endpoint: Some(format!("{base_url}/json/{{ip}}")),
        timeout_ms: 2_000,
        max_response_bytes: 1_024,
        ..GeoConfig::default()
    };
    let resolver = HttpGeoResolver::from_config(&config).unwrap();
    (resolver, StubGuard(Some((shutdown, join))))
}

/// Stops the stub on drop.
struct StubGuard(Option<(tokio::sync::oneshot::Sender<()>, std::thread::JoinHandle<()>)>);

impl Drop for StubGuard {
    fn drop(&mut self) {
        if let Some((shutdown, join)) = self.0.take() {
            let _ = shutdown.send(());
            let _ = join.join();
        }
    }
}

// ============================================================================
// SECTION: Lookups
// ============================================================================

#[test]
fn lookup_maps_country_tier_and_flags() {
    let (resolver, _guard) = resolver();
    let info = resolver.lookup("203.0.113.1").unwrap();
    assert_eq!(info.country_code.as_str(), "DE");
    assert_eq!(info.tier, Tier::Tier1);
    assert!(info.is_vpn);
    assert!(!info.is_proxy);
}

#[test]
fn lookup_failures_are_reported_not_panicked() {
    let (resolver, _guard) = resolver();
    assert!(matches!(resolver.lookup("203.0.113.2"), Err(GeoError::Unavailable(_))));
    assert!(matches!(resolver.lookup("203.0.113.3"), Err(GeoError::Invalid(_))));
    assert!(matches!(resolver.lookup("203.0.113.4"), Err(GeoError::Invalid(_))));
    assert!(resolver.lookup("203.0.113.5").is_err());
    assert!(matches!(resolver.lookup("unknown"), Err(GeoError::Invalid(_))));
}

// ============================================================================
// SECTION: Fallback
// ============================================================================

/// Resolver that always fails.
struct DownResolver;

impl GeoResolver for DownResolver {
    fn lookup(&self, _ip_address: &str) -> Result<GeoInfo, GeoError> {
        Err(GeoError::Unavailable("lookup service down".to_string()))
    }
}

#[test]
fn failed_lookup_falls_back_and_is_audited() {
    let server = TestServer::start_with(EngineConfig::default(), Arc::new(DownResolver), 65_536);
    let url = server.url(&format!("/lockers/{LOCKER}/tasks"));
    let response = server.client.get(url).header("x-forwarded-for", "192.0.2.44").send().unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["offers"].as_array().unwrap().len(), 2);
    let fallbacks = server.audit.records_named("geo_fallback");
    assert_eq!(fallbacks.len(), 1);
    assert_eq!(fallbacks[0]["ip_address"], "192.0.2.44");
    assert!(fallbacks[0]["error"].as_str().unwrap().contains("down"));
}
