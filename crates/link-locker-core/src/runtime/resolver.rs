// crates/link-locker-core/src/runtime/resolver.rs
// ============================================================================
// Module: Link Locker Ad-URL and Rate Resolver
// Description: Resolves the outbound ad URL and CPM rate for one task.
// Purpose: Apply the fixed override priority chain with an explicit unset result.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! Ad URLs resolve first-match-wins through: the slot override, the locker's
//! common URL, the locker's tiered URL (visitor tier, then tier1, tier2,
//! tier3), and the task default. Blank strings count as unset, and the chain
//! ends in [`AdUrlResolution::Unset`] rather than an empty URL. Rates follow
//! the same priority with the override CPM and the task's tier CPM.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::AdUrlMode;
use crate::core::DeviceTargetingOverride;
use crate::core::Locker;
use crate::core::Money;
use crate::core::Task;
use crate::core::Tier;
use crate::core::VisitorContext;

// ============================================================================
// SECTION: Ad URLs
// ============================================================================

/// Step of the priority chain that produced an ad URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdUrlSource {
    /// Device targeting override for the visitor's slot.
    DeviceOverride,
    /// Locker common URL.
    LockerCommon,
    /// Locker tiered URL for the given tier.
    LockerTiered {
        /// Tier whose URL was used.
        tier: Tier,
    },
    /// Task default URL.
    TaskDefault,
}

/// Result of ad URL resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdUrlResolution {
    /// A usable URL was found.
    Resolved {
        /// Outbound URL.
        url: String,
        /// Chain step that supplied it.
        source: AdUrlSource,
    },
    /// No step supplied a URL; the task must not be dispatched.
    Unset,
}

impl AdUrlResolution {
    /// Returns the resolved URL, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Resolved { url, .. } => Some(url),
            Self::Unset => None,
        }
    }

    /// Returns the chain step, if any.
    #[must_use]
    pub const fn source(&self) -> Option<AdUrlSource> {
        match self {
            Self::Resolved { source, .. } => Some(*source),
            Self::Unset => None,
        }
    }
}

/// Resolves the outbound ad URL for a task and visitor.
#[must_use]
pub fn resolve_ad_url(
    task: &Task,
    visitor: &VisitorContext,
    locker: &Locker,
    slot_override: Option<&DeviceTargetingOverride>,
) -> AdUrlResolution {
    let slot = applicable_override(task, slot_override);
    if let Some(url) = slot.and_then(DeviceTargetingOverride::configured_ad_url) {
        return resolved(url, AdUrlSource::DeviceOverride);
    }
    match locker.ad_url_mode {
        AdUrlMode::Common => {
            if let Some(url) = locker.configured_common_ad_url() {
                return resolved(url, AdUrlSource::LockerCommon);
            }
        }
        AdUrlMode::Tiered => {
            let fallback = std::iter::once(visitor.tier).chain(Tier::ALL);
            for tier in fallback {
                if let Some(url) = locker.tiered_ad_url(tier) {
                    return resolved(url, AdUrlSource::LockerTiered { tier });
                }
            }
        }
    }
    task.configured_ad_url()
        .map_or(AdUrlResolution::Unset, |url| resolved(url, AdUrlSource::TaskDefault))
}

/// Builds a resolved URL result.
fn resolved(url: &str, source: AdUrlSource) -> AdUrlResolution {
    AdUrlResolution::Resolved {
        url: url.to_string(),
        source,
    }
}

/// Returns the slot override when it applies to the task.
fn applicable_override<'a>(
    task: &Task,
    slot_override: Option<&'a DeviceTargetingOverride>,
) -> Option<&'a DeviceTargetingOverride> {
    slot_override.filter(|slot| slot.applies_to(&task.task_id))
}

// ============================================================================
// SECTION: Rates
// ============================================================================

/// Step of the priority chain that produced a rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateSource {
    /// Device targeting override CPM.
    DeviceOverride,
    /// Task CPM for the visitor's tier.
    TaskTier {
        /// Tier whose CPM was used.
        tier: Tier,
    },
}

/// Resolved CPM rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateResolution {
    /// CPM to apply.
    pub cpm: Money,
    /// Chain step that supplied it.
    pub source: RateSource,
}

impl RateResolution {
    /// Returns the revenue for one completion at this rate.
    #[must_use]
    pub fn revenue_per_completion(&self) -> Money {
        self.cpm.per_mille()
    }
}

/// Resolves the CPM rate for a task and visitor.
#[must_use]
pub fn resolve_rate(
    task: &Task,
    visitor: &VisitorContext,
    slot_override: Option<&DeviceTargetingOverride>,
) -> RateResolution {
    if let Some(cpm) = applicable_override(task, slot_override).and_then(|slot| slot.cpm.as_ref()) {
        return RateResolution {
            cpm: cpm.clone(),
            source: RateSource::DeviceOverride,
        };
    }
    RateResolution {
        cpm: task.cpm_for(visitor.tier).clone(),
        source: RateSource::TaskTier { tier: visitor.tier },
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
