// crates/link-locker-core/src/core/targeting.rs
// ============================================================================
// Module: Link Locker Targeting Vocabulary
// Description: Device, browser, tier, and country types plus overrides.
// Purpose: Give targeting rules a typed, closed vocabulary.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Targeting vocabulary shared by the targeting resolver and the ad-URL and
//! rate resolver. Task-side sets are deserialized leniently: unknown labels
//! are dropped rather than rejected, so tasks written by older dashboards
//! keep loading after the vocabulary evolves.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::identifiers::TaskId;
use crate::core::money::Money;

// ============================================================================
// SECTION: Labels
// ============================================================================

/// Closed vocabularies parsed from free-form labels.
pub trait Label: Sized + Ord {
    /// Parses a label case-insensitively, returning `None` for unknown values.
    fn parse_label(value: &str) -> Option<Self>;

    /// Returns the canonical label.
    fn as_label(&self) -> &'static str;
}

/// Deserializes a set of labels, dropping unknown or malformed entries.
///
/// `null`, a missing field, or a non-array value all yield an empty set.
///
/// # Errors
///
/// Returns a deserializer error only when the input is not valid for the
/// underlying format.
pub fn deserialize_label_set<'de, D, T>(deserializer: D) -> Result<BTreeSet<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Label,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(labels_from_value(value.as_ref()))
}

/// Deserializes an optional set of labels; an absent or empty set yields `None`.
///
/// # Errors
///
/// Returns a deserializer error only when the input is not valid for the
/// underlying format.
pub fn deserialize_optional_label_set<'de, D, T>(
    deserializer: D,
) -> Result<Option<BTreeSet<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Label,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let labels: BTreeSet<T> = labels_from_value(value.as_ref());
    Ok(if labels.is_empty() { None } else { Some(labels) })
}

/// Collects known labels from a JSON array value.
fn labels_from_value<T: Label>(value: Option<&Value>) -> BTreeSet<T> {
    let Some(Value::Array(items)) = value else {
        return BTreeSet::new();
    };
    items.iter().filter_map(Value::as_str).filter_map(T::parse_label).collect()
}

// ============================================================================
// SECTION: Tier
// ============================================================================

/// Country pricing tier (tier1 is the highest value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Highest-value countries.
    Tier1,
    /// Mid-value countries.
    Tier2,
    /// Remaining countries.
    Tier3,
}

impl Tier {
    /// All tiers in priority order.
    pub const ALL: [Self; 3] = [Self::Tier1, Self::Tier2, Self::Tier3];
}

impl Label for Tier {
    fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tier1" | "1" => Some(Self::Tier1),
            "tier2" | "2" => Some(Self::Tier2),
            "tier3" | "3" => Some(Self::Tier3),
            _ => None,
        }
    }

    fn as_label(&self) -> &'static str {
        match self {
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Tier3 => "tier3",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

// ============================================================================
// SECTION: Device and Browser
// ============================================================================

/// Visitor device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// Desktop or laptop browsers.
    Desktop,
    /// Phones.
    Mobile,
    /// Tablets.
    Tablet,
}

impl Label for Device {
    fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "desktop" | "pc" => Some(Self::Desktop),
            "mobile" | "phone" => Some(Self::Mobile),
            "tablet" => Some(Self::Tablet),
            _ => None,
        }
    }

    fn as_label(&self) -> &'static str {
        match self {
            Self::Desktop => "desktop",
            Self::Mobile => "mobile",
            Self::Tablet => "tablet",
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Visitor browser family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    /// Google Chrome and Chromium.
    Chrome,
    /// Mozilla Firefox.
    Firefox,
    /// Apple Safari.
    Safari,
    /// Microsoft Edge.
    Edge,
    /// Opera.
    Opera,
    /// Samsung Internet.
    Samsung,
    /// Anything else.
    Other,
}

impl Label for Browser {
    fn parse_label(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Some(Self::Chrome),
            "firefox" => Some(Self::Firefox),
            "safari" => Some(Self::Safari),
            "edge" => Some(Self::Edge),
            "opera" => Some(Self::Opera),
            "samsung" | "samsungbrowser" => Some(Self::Samsung),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    fn as_label(&self) -> &'static str {
        match self {
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
            Self::Safari => "safari",
            Self::Edge => "edge",
            Self::Opera => "opera",
            Self::Samsung => "samsung",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Browser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

// ============================================================================
// SECTION: Country Codes
// ============================================================================

/// Country code parse error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid country code: {0}")]
pub struct CountryCodeError(pub String);

/// ISO 3166-1 alpha-2 country code, stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CountryCode(String);

impl CountryCode {
    /// Parses a two-letter country code case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`CountryCodeError`] unless the input is exactly two ASCII letters.
    pub fn parse(value: &str) -> Result<Self, CountryCodeError> {
        let trimmed = value.trim();
        if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(CountryCodeError(value.to_string()))
        }
    }

    /// Returns the `US` country code used as the geolocation fallback.
    #[must_use]
    pub fn us() -> Self {
        Self("US".to_string())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CountryCode {
    type Error = CountryCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CountryCode> for String {
    fn from(value: CountryCode) -> Self {
        value.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Device Targeting Overrides
// ============================================================================

/// Composite key for device targeting overrides.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideKey {
    /// Device class.
    pub device: Device,
    /// Country code.
    pub country_code: CountryCode,
}

/// Highest-priority targeting override for a `(device, country)` slot.
///
/// # Invariants
/// - A missing override for a key means "no override"; every resolver step
///   then falls through to locker- and task-level settings.
/// - Each optional field is resolved independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceTargetingOverride {
    /// Device class.
    pub device: Device,
    /// Country code.
    pub country_code: CountryCode,
    /// When set, only this task is offered in the slot.
    #[serde(default)]
    pub task_id: Option<TaskId>,
    /// Outbound ad URL for the slot.
    #[serde(default)]
    pub ad_url: Option<String>,
    /// CPM rate for the slot.
    #[serde(default)]
    pub cpm: Option<Money>,
}

impl DeviceTargetingOverride {
    /// Creates an empty override for a slot.
    #[must_use]
    pub const fn new(device: Device, country_code: CountryCode) -> Self {
        Self {
            device,
            country_code,
            task_id: None,
            ad_url: None,
            cpm: None,
        }
    }

    /// Returns the composite lookup key.
    #[must_use]
    pub fn key(&self) -> OverrideKey {
        OverrideKey {
            device: self.device,
            country_code: self.country_code.clone(),
        }
    }

    /// Returns true when the override applies to `task_id`.
    ///
    /// Overrides without a task restriction apply to every task.
    #[must_use]
    pub fn applies_to(&self, task_id: &TaskId) -> bool {
        self.task_id.as_ref().is_none_or(|selected| selected == task_id)
    }

    /// Returns the configured ad URL when it is non-blank.
    #[must_use]
    pub fn configured_ad_url(&self) -> Option<&str> {
        non_blank(self.ad_url.as_deref())
    }
}

/// Returns the input when it contains non-whitespace characters.
#[must_use]
pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
