// crates/link-locker-core/src/core/catalog.rs
// ============================================================================
// Module: Link Locker Catalog
// Description: Task and locker definitions authored by publishers and operators.
// Purpose: Model the read-mostly catalog consulted on every visit.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Tasks are vendor offers priced per thousand completions by country tier.
//! Lockers are publisher links that accept a set of task categories and may
//! override the outbound ad URL. Every optional task field defaults to the
//! permissive value so tasks saved before a field existed stay eligible.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::LockerId;
use crate::core::identifiers::PublisherId;
use crate::core::identifiers::TaskId;
use crate::core::money::Money;
use crate::core::targeting::Browser;
use crate::core::targeting::Device;
use crate::core::targeting::Tier;
use crate::core::targeting::deserialize_label_set;
use crate::core::targeting::deserialize_optional_label_set;
use crate::core::targeting::non_blank;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Shortest allowed dwell time for a task, in seconds.
pub const MIN_COMPLETION_TIME_SECONDS: u32 = 5;
/// Longest allowed dwell time for a task, in seconds.
pub const MAX_COMPLETION_TIME_SECONDS: u32 = 300;
/// Dwell time applied when a task does not declare one.
const DEFAULT_COMPLETION_TIME_SECONDS: u32 = 30;

// ============================================================================
// SECTION: Task Types
// ============================================================================

/// Task category tag, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TaskType(String);

impl TaskType {
    /// Creates a normalized task type.
    #[must_use]
    pub fn new(value: impl AsRef<str>) -> Self {
        Self(value.as_ref().trim().to_ascii_lowercase())
    }

    /// Returns the normalized label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TaskType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for TaskType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<TaskType> for String {
    fn from(value: TaskType) -> Self {
        value.0
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Tasks
// ============================================================================

/// Task availability status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Offered to visitors.
    #[default]
    Active,
    /// Soft-disabled; kept for ledger references.
    Inactive,
}

/// Vendor task definition.
///
/// # Invariants
/// - Empty `target_devices` means every device.
/// - Empty `excluded_browsers` means no browser is excluded.
/// - `target_tiers = None` means every tier (legacy tasks).
/// - `completion_time_seconds` is clamped to
///   [`MIN_COMPLETION_TIME_SECONDS`]..=[`MAX_COMPLETION_TIME_SECONDS`] when used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task identifier.
    pub task_id: TaskId,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Display description.
    #[serde(default)]
    pub description: String,
    /// Category tag matched against the locker's accepted types.
    #[serde(default = "default_task_type")]
    pub task_type: TaskType,
    /// Device classes the task is offered to.
    #[serde(default, deserialize_with = "deserialize_label_set")]
    pub target_devices: BTreeSet<Device>,
    /// Browsers the task is hidden from.
    #[serde(default, deserialize_with = "deserialize_label_set")]
    pub excluded_browsers: BTreeSet<Browser>,
    /// Tiers the task is offered to.
    #[serde(default, deserialize_with = "deserialize_optional_label_set")]
    pub target_tiers: Option<BTreeSet<Tier>>,
    /// Minimum dwell time before completion, in seconds.
    #[serde(default = "default_completion_time_seconds")]
    pub completion_time_seconds: u32,
    /// CPM for tier-1 visitors.
    #[serde(default)]
    pub cpm_tier1: Money,
    /// CPM for tier-2 visitors.
    #[serde(default)]
    pub cpm_tier2: Money,
    /// CPM for tier-3 visitors.
    #[serde(default)]
    pub cpm_tier3: Money,
    /// Task-level default outbound ad URL.
    #[serde(default)]
    pub ad_url: Option<String>,
    /// Availability status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Shared secret for postback signatures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postback_secret: Option<String>,
}

/// Returns the task type used when none is declared.
fn default_task_type() -> TaskType {
    TaskType::new("general")
}

/// Returns the dwell time used when none is declared.
const fn default_completion_time_seconds() -> u32 {
    DEFAULT_COMPLETION_TIME_SECONDS
}

impl Task {
    /// Creates an active task with permissive targeting and zero rates.
    #[must_use]
    pub fn new(task_id: impl Into<TaskId>, task_type: impl AsRef<str>) -> Self {
        Self {
            task_id: task_id.into(),
            title: String::new(),
            description: String::new(),
            task_type: TaskType::new(task_type),
            target_devices: BTreeSet::new(),
            excluded_browsers: BTreeSet::new(),
            target_tiers: None,
            completion_time_seconds: DEFAULT_COMPLETION_TIME_SECONDS,
            cpm_tier1: Money::zero(),
            cpm_tier2: Money::zero(),
            cpm_tier3: Money::zero(),
            ad_url: None,
            status: TaskStatus::Active,
            postback_secret: None,
        }
    }

    /// Returns the CPM configured for a tier.
    #[must_use]
    pub const fn cpm_for(&self, tier: Tier) -> &Money {
        match tier {
            Tier::Tier1 => &self.cpm_tier1,
            Tier::Tier2 => &self.cpm_tier2,
            Tier::Tier3 => &self.cpm_tier3,
        }
    }

    /// Returns true when the task is offered to `tier` (unset tiers permit all).
    #[must_use]
    pub fn targets_tier(&self, tier: Tier) -> bool {
        self.target_tiers.as_ref().is_none_or(|tiers| tiers.is_empty() || tiers.contains(&tier))
    }

    /// Returns the dwell time clamped to the supported range.
    #[must_use]
    pub fn effective_completion_time_seconds(&self) -> u32 {
        self.completion_time_seconds.clamp(MIN_COMPLETION_TIME_SECONDS, MAX_COMPLETION_TIME_SECONDS)
    }

    /// Returns the task-level ad URL when it is non-blank.
    #[must_use]
    pub fn configured_ad_url(&self) -> Option<&str> {
        non_blank(self.ad_url.as_deref())
    }

    /// Returns the postback secret when it is non-blank.
    #[must_use]
    pub fn configured_postback_secret(&self) -> Option<&str> {
        non_blank(self.postback_secret.as_deref())
    }
}

// ============================================================================
// SECTION: Lockers
// ============================================================================

/// Locker-level ad URL override mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdUrlMode {
    /// One URL for every visitor.
    #[default]
    Common,
    /// One URL per tier.
    Tiered,
}

/// Publisher-owned gated link.
///
/// # Invariants
/// - An empty `task_types` set accepts every task category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Locker {
    /// Locker identifier.
    pub locker_id: LockerId,
    /// Owning publisher.
    pub user_id: PublisherId,
    /// Destination revealed after unlocking.
    pub destination_url: String,
    /// Locker-level ad URL mode.
    #[serde(default)]
    pub ad_url_mode: AdUrlMode,
    /// Ad URL used in common mode.
    #[serde(default)]
    pub common_ad_url: Option<String>,
    /// Ad URLs per tier used in tiered mode.
    #[serde(default)]
    pub tiered_ad_urls: BTreeMap<Tier, String>,
    /// Accepted task categories.
    #[serde(default)]
    pub task_types: BTreeSet<TaskType>,
}

impl Locker {
    /// Creates a locker with no ad URL overrides that accepts every task type.
    #[must_use]
    pub fn new(
        locker_id: impl Into<LockerId>,
        user_id: impl Into<PublisherId>,
        destination_url: impl Into<String>,
    ) -> Self {
        Self {
            locker_id: locker_id.into(),
            user_id: user_id.into(),
            destination_url: destination_url.into(),
            ad_url_mode: AdUrlMode::Common,
            common_ad_url: None,
            tiered_ad_urls: BTreeMap::new(),
            task_types: BTreeSet::new(),
        }
    }

    /// Returns true when the locker accepts tasks of `task_type`.
    #[must_use]
    pub fn accepts(&self, task_type: &TaskType) -> bool {
        self.task_types.is_empty() || self.task_types.contains(task_type)
    }

    /// Returns the tiered ad URL for `tier` when it is non-blank.
    #[must_use]
    pub fn tiered_ad_url(&self, tier: Tier) -> Option<&str> {
        non_blank(self.tiered_ad_urls.get(&tier).map(String::as_str))
    }

    /// Returns the common ad URL when it is non-blank.
    #[must_use]
    pub fn configured_common_ad_url(&self) -> Option<&str> {
        non_blank(self.common_ad_url.as_deref())
    }
}
