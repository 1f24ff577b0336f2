// crates/link-locker-core/src/runtime/geo.rs
// ============================================================================
// Module: Link Locker Geolocation Fallback
// Description: Static resolver and fail-soft geolocation lookup.
// Purpose: Keep dispatch working when the geolocation dependency fails.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Geolocation failures never abort a request. [`resolve_geo_or_default`]
//! substitutes the configured fallback answer and hands the error back so the
//! caller can audit it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::GeoInfo;
use crate::interfaces::GeoError;
use crate::interfaces::GeoResolver;

// ============================================================================
// SECTION: Resolvers
// ============================================================================

/// Resolver that answers every lookup with the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticGeoResolver {
    /// Fixed answer.
    answer: GeoInfo,
}

impl StaticGeoResolver {
    /// Creates a resolver with a fixed answer.
    #[must_use]
    pub const fn new(answer: GeoInfo) -> Self {
        Self {
            answer,
        }
    }
}

impl GeoResolver for StaticGeoResolver {
    fn lookup(&self, _ip_address: &str) -> Result<GeoInfo, GeoError> {
        Ok(self.answer.clone())
    }
}

/// Looks up a visitor IP, falling back to `fallback` on any error.
///
/// Returns the answer and the swallowed error, if any.
#[must_use]
pub fn resolve_geo_or_default(
    resolver: &dyn GeoResolver,
    ip_address: &str,
    fallback: &GeoInfo,
) -> (GeoInfo, Option<GeoError>) {
    match resolver.lookup(ip_address) {
        Ok(info) => (info, None),
        Err(err) => (fallback.clone(), Some(err)),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
