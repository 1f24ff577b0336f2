// crates/link-locker-core/src/core/visitor.rs
// ============================================================================
// Module: Link Locker Visitor Context
// Description: Ephemeral per-page-load visitor context.
// Purpose: Combine user-agent classification and geolocation into one DTO.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`VisitorContext`] is resolved once per page load and passed by value
//! through the targeting and attribution functions. It is never persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::targeting::Browser;
use crate::core::targeting::CountryCode;
use crate::core::targeting::Device;
use crate::core::targeting::OverrideKey;
use crate::core::targeting::Tier;

// ============================================================================
// SECTION: Geolocation
// ============================================================================

/// Countries priced at tier 1.
const TIER1_COUNTRIES: &[&str] = &[
    "AU", "AT", "BE", "CA", "CH", "DE", "DK", "FI", "FR", "GB", "IE", "LU", "NL", "NO", "NZ", "SE",
    "US",
];

/// Countries priced at tier 2.
const TIER2_COUNTRIES: &[&str] = &[
    "AE", "CZ", "ES", "HK", "IL", "IT", "JP", "KR", "PL", "PT", "QA", "SA", "SG", "TW",
];

/// Returns the pricing tier for a country.
#[must_use]
pub fn tier_for_country(country: &CountryCode) -> Tier {
    if TIER1_COUNTRIES.contains(&country.as_str()) {
        Tier::Tier1
    } else if TIER2_COUNTRIES.contains(&country.as_str()) {
        Tier::Tier2
    } else {
        Tier::Tier3
    }
}

/// Opaque geolocation answer for a visitor IP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoInfo {
    /// Visitor country.
    pub country_code: CountryCode,
    /// Pricing tier for the country.
    pub tier: Tier,
    /// Lookup flagged the address as a VPN exit.
    #[serde(default)]
    pub is_vpn: bool,
    /// Lookup flagged the address as a proxy.
    #[serde(default)]
    pub is_proxy: bool,
}

impl GeoInfo {
    /// Returns the answer used when geolocation is unavailable.
    #[must_use]
    pub const fn fallback(country_code: CountryCode, tier: Tier) -> Self {
        Self {
            country_code,
            tier,
            is_vpn: false,
            is_proxy: false,
        }
    }
}

// ============================================================================
// SECTION: Visitor Context
// ============================================================================

/// Visitor context resolved from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitorContext {
    /// Client IP address used as the eligibility identity.
    pub ip_address: String,
    /// Device class.
    pub device: Device,
    /// Browser family.
    pub browser: Browser,
    /// Visitor country.
    pub country_code: CountryCode,
    /// Pricing tier.
    pub tier: Tier,
    /// VPN flag from geolocation.
    pub is_vpn: bool,
    /// Proxy flag from geolocation.
    pub is_proxy: bool,
}

impl VisitorContext {
    /// Builds a visitor context from an IP, a user agent, and a geolocation answer.
    #[must_use]
    pub fn resolve(ip_address: impl Into<String>, user_agent: &str, geo: GeoInfo) -> Self {
        let (device, browser) = classify_user_agent(user_agent);
        Self {
            ip_address: ip_address.into(),
            device,
            browser,
            country_code: geo.country_code,
            tier: geo.tier,
            is_vpn: geo.is_vpn,
            is_proxy: geo.is_proxy,
        }
    }

    /// Returns the override slot this visitor falls into.
    #[must_use]
    pub fn override_key(&self) -> OverrideKey {
        OverrideKey {
            device: self.device,
            country_code: self.country_code.clone(),
        }
    }
}

// ============================================================================
// SECTION: User-Agent Classification
// ============================================================================

/// Classifies a user agent into a device class and browser family.
///
/// Unknown agents classify as desktop with browser `other`.
#[must_use]
pub fn classify_user_agent(user_agent: &str) -> (Device, Browser) {
    let ua = user_agent.to_ascii_lowercase();
    (classify_device(&ua), classify_browser(&ua))
}

/// Classifies the device class from a lowercased user agent.
fn classify_device(ua: &str) -> Device {
    let android = ua.contains("android");
    if ua.contains("ipad") || ua.contains("tablet") || (android && !ua.contains("mobile")) {
        Device::Tablet
    } else if android || ua.contains("iphone") || ua.contains("ipod") || ua.contains("mobi") {
        Device::Mobile
    } else {
        Device::Desktop
    }
}

/// Classifies the browser family from a lowercased user agent.
///
/// Order matters: Chromium derivatives also advertise `chrome` and `safari`.
fn classify_browser(ua: &str) -> Browser {
    if ua.contains("samsungbrowser") {
        Browser::Samsung
    } else if ["edg/", "edge/", "edga/", "edgios/"].iter().any(|token| ua.contains(token)) {
        Browser::Edge
    } else if ua.contains("opr/") || ua.contains("opera") {
        Browser::Opera
    } else if ua.contains("firefox/") || ua.contains("fxios/") {
        Browser::Firefox
    } else if ua.contains("chrome/") || ua.contains("crios/") || ua.contains("chromium/") {
        Browser::Chrome
    } else if ua.contains("safari/") {
        Browser::Safari
    } else {
        Browser::Other
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
