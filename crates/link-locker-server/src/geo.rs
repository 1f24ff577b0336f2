// crates/link-locker-server/src/geo.rs
// ============================================================================
// Module: Link Locker HTTP Geolocation
// Description: Bounded blocking HTTP lookup of visitor country.
// Purpose: Resolve visitor IPs to a country, tier, and VPN/proxy flags.
// Dependencies: link-locker-core, reqwest, url
// ============================================================================

//! ## Overview
//! [`HttpGeoResolver`] issues one GET per lookup against an endpoint template
//! whose `{ip}` placeholder is replaced by the visitor IP. Every failure mode
//! (timeout, non-success status, oversized or malformed body) is reported as a
//! [`GeoError`]; callers fall back to configured defaults.
//! Invariants:
//! - Redirects are rejected.
//! - Response bodies are capped at `max_response_bytes`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Read;
use std::time::Duration;

use link_locker_config::GEO_IP_PLACEHOLDER;
use link_locker_config::GeoConfig;
use link_locker_core::CountryCode;
use link_locker_core::GeoError;
use link_locker_core::GeoInfo;
use link_locker_core::GeoResolver;
use link_locker_core::tier_for_country;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::Deserialize;
use url::Url;

// ============================================================================
// SECTION: Payload
// ============================================================================

/// Lookup response body.
#[derive(Debug, Deserialize)]
struct GeoPayload {
    /// Two-letter country code.
    #[serde(alias = "countryCode", alias = "country")]
    country_code: String,
    /// VPN flag.
    #[serde(default, alias = "isVpn", alias = "vpn")]
    is_vpn: bool,
    /// Proxy flag.
    #[serde(default, alias = "isProxy", alias = "proxy")]
    is_proxy: bool,
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// HTTP-backed geolocation resolver.
#[derive(Debug, Clone)]
pub struct HttpGeoResolver {
    /// HTTP client with the lookup timeout applied.
    client: Client,
    /// Endpoint template containing `{ip}`.
    endpoint: String,
    /// Maximum accepted body size.
    max_response_bytes: usize,
}

impl HttpGeoResolver {
    /// Builds a resolver from geolocation configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::Unavailable`] when no endpoint is configured or the
    /// HTTP client cannot be constructed.
    pub fn from_config(config: &GeoConfig) -> Result<Self, GeoError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or_else(|| GeoError::Unavailable("geo endpoint not configured".to_string()))?;
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            max_response_bytes: config.max_response_bytes,
        })
    }

    /// Builds the lookup URL for one IP.
    fn lookup_url(&self, ip_address: &str) -> Result<Url, GeoError> {
        let ip = ip_address.trim();
        if ip.parse::<std::net::IpAddr>().is_err() {
            return Err(GeoError::Invalid(format!("not an ip address: {ip}")));
        }
        Url::parse(&self.endpoint.replace(GEO_IP_PLACEHOLDER, ip))
            .map_err(|err| GeoError::Invalid(err.to_string()))
    }
}

impl GeoResolver for HttpGeoResolver {
    fn lookup(&self, ip_address: &str) -> Result<GeoInfo, GeoError> {
        let url = self.lookup_url(ip_address)?;
        let response = self
            .client
            .get(url.as_str())
            .send()
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(GeoError::Unavailable(format!("http status {}", response.status())));
        }
        let max_bytes = u64::try_from(self.max_response_bytes).unwrap_or(u64::MAX);
        if response.content_length().is_some_and(|length| length > max_bytes) {
            return Err(GeoError::Invalid("response exceeds size limit".to_string()));
        }
        let mut body = Vec::new();
        response
            .take(max_bytes.saturating_add(1))
            .read_to_end(&mut body)
            .map_err(|err| GeoError::Unavailable(err.to_string()))?;
        if body.len() > self.max_response_bytes {
            return Err(GeoError::Invalid("response exceeds size limit".to_string()));
        }
        parse_geo_payload(&body)
    }
}

/// Decodes a lookup body into a geolocation answer.
fn parse_geo_payload(body: &[u8]) -> Result<GeoInfo, GeoError> {
    let payload: GeoPayload =
        serde_json::from_slice(body).map_err(|err| GeoError::Invalid(err.to_string()))?;
    let country_code = CountryCode::parse(&payload.country_code)
        .map_err(|err| GeoError::Invalid(err.to_string()))?;
    Ok(GeoInfo {
        tier: tier_for_country(&country_code),
        country_code,
        is_vpn: payload.is_vpn,
        is_proxy: payload.is_proxy,
    })
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

    use link_locker_core::Tier;

    use super::*;

    #[test]
    fn payload_accepts_common_field_spellings() {
        let info = parse_geo_payload(br#"{"countryCode":"de","proxy":true}"#).unwrap();
        assert_eq!(info.country_code.as_str(), "DE");
        assert_eq!(info.tier, Tier::Tier1);
        assert!(info.is_proxy);
        assert!(!info.is_vpn);
        let info = parse_geo_payload(br#"{"country_code":"BR","is_vpn":true}"#).unwrap();
        assert_eq!(info.tier, Tier::Tier3);
        assert!(info.is_vpn);
    }

    #[test]
    fn payload_rejects_bad_country() {
        let err = parse_geo_payload(br#"{"country":"Germany"}"#).unwrap_err();
        assert!(matches!(err, GeoError::Invalid(_)));
    }

    #[test]
    fn lookup_url_substitutes_ip_and_rejects_garbage() {
        let config = GeoConfig {
            endpoint: Some("http://geo.example/json/{ip}?fields=countryCode".to_string()),
            ..GeoConfig::default()
        };
        let resolver = HttpGeoResolver::from_config(&config).unwrap();
        let url = resolver.lookup_url("203.0.113.9").unwrap();
        assert_eq!(url.path(), "/json/203.0.113.9");
        assert!(matches!(resolver.lookup_url("203.0.113.9/../x"), Err(GeoError::Invalid(_))));
    }
}
