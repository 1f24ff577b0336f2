// crates/link-locker-core/src/core/eligibility.rs
// ============================================================================
// Module: Link Locker Eligibility Records
// Description: Keys, records, and decisions for the repeat-occurrence gate.
// Purpose: Model cooldown bookkeeping per (ip, entity, event kind).
// Dependencies: serde
// ============================================================================

//! ## Overview
//! An [`EligibilityRecord`] exists at most once per [`EligibilityKey`]. The
//! entity is the locker for `visit`/`unlock` events and the task for
//! `task_complete` events, so each kind is gated independently.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::LockerId;
use crate::core::identifiers::TaskId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Event Kinds
// ============================================================================

/// Event kinds gated independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Locker page view.
    Visit,
    /// Destination revealed.
    Unlock,
    /// Task completion.
    TaskComplete,
}

impl EventKind {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Visit => "visit",
            Self::Unlock => "unlock",
            Self::TaskComplete => "task_complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "visit" => Ok(Self::Visit),
            "unlock" => Ok(Self::Unlock),
            "task_complete" => Ok(Self::TaskComplete),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Keys and Records
// ============================================================================

/// Natural key of an eligibility record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityKey {
    /// Visitor IP address.
    pub ip_address: String,
    /// Locker id for visit/unlock, task id for task completion.
    pub target_entity_id: String,
    /// Event kind.
    pub event_kind: EventKind,
}

impl EligibilityKey {
    /// Builds a key for a locker-scoped event (`visit` or `unlock`).
    #[must_use]
    pub fn for_locker(
        ip_address: impl Into<String>,
        locker_id: &LockerId,
        kind: EventKind,
    ) -> Self {
        Self {
            ip_address: ip_address.into(),
            target_entity_id: locker_id.as_str().to_string(),
            event_kind: kind,
        }
    }

    /// Builds a key for a task completion.
    #[must_use]
    pub fn for_task(ip_address: impl Into<String>, task_id: &TaskId) -> Self {
        Self {
            ip_address: ip_address.into(),
            target_entity_id: task_id.as_str().to_string(),
            event_kind: EventKind::TaskComplete,
        }
    }
}

/// Cooldown bookkeeping for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRecord {
    /// Natural key.
    pub key: EligibilityKey,
    /// Start of the current window.
    pub first_occurrence_at: Timestamp,
    /// Most recent occurrence.
    pub last_occurrence_at: Timestamp,
    /// Occurrences in the current window.
    pub occurrence_count: u64,
}

impl EligibilityRecord {
    /// Creates the record for a first occurrence.
    #[must_use]
    pub const fn first(key: EligibilityKey, now: Timestamp) -> Self {
        Self {
            key,
            first_occurrence_at: now,
            last_occurrence_at: now,
            occurrence_count: 1,
        }
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Reason attached to a gate decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateReason {
    /// No record existed for the key.
    FirstOccurrence,
    /// A record exists and its window is still open.
    DuplicateWithinWindow,
    /// The previous window elapsed and the record was reset.
    CooldownExpired,
}

impl GateReason {
    /// Returns a human-readable message for the reason.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::FirstOccurrence => "first occurrence counted",
            Self::DuplicateWithinWindow => "already counted within the cooldown window",
            Self::CooldownExpired => "cooldown expired, occurrence counted",
        }
    }
}

/// Outcome of consulting the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateDecision {
    /// True when analytics and revenue should be recorded.
    pub should_count: bool,
    /// Decision reason.
    pub reason: GateReason,
    /// Occurrences in the current window after this one.
    pub occurrence_count: u64,
}

impl GateDecision {
    /// Builds a counting decision.
    #[must_use]
    pub const fn counted(reason: GateReason) -> Self {
        Self {
            should_count: true,
            reason,
            occurrence_count: 1,
        }
    }

    /// Builds a duplicate decision.
    #[must_use]
    pub const fn duplicate(occurrence_count: u64) -> Self {
        Self {
            should_count: false,
            reason: GateReason::DuplicateWithinWindow,
            occurrence_count,
        }
    }
}

/// Reason attached to a read-only cooldown status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownReason {
    /// No record exists for the key.
    NeverCompleted,
    /// The window is still open.
    CooldownActive,
    /// The window has elapsed.
    CooldownExpired,
}

/// Read-only cooldown status for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CooldownStatus {
    /// True when the next occurrence would be counted.
    pub can_complete: bool,
    /// Status reason.
    pub reason: CooldownReason,
    /// Whole hours left in the window, rounded up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours_remaining: Option<u64>,
}
