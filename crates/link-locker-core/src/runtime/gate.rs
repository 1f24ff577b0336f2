// crates/link-locker-core/src/runtime/gate.rs
// ============================================================================
// Module: Link Locker Eligibility Gate
// Description: Cooldown-window deduplication per (ip, entity, event kind).
// Purpose: Decide whether an occurrence counts toward analytics and revenue.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The gate is a check-then-act sequence over an [`EligibilityStore`]. The
//! store's uniqueness constraint on the key turns a lost insert race into
//! [`StoreError::Conflict`], and the window reset is a compare-and-set on
//! `first_occurrence_at`; both losing paths are reported as duplicates, so
//! two concurrent first occurrences never both count.
//!
//! Security posture: the gate only governs counting. Callers still show the
//! visitor a successful flow when the gate refuses.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::CooldownReason;
use crate::core::CooldownStatus;
use crate::core::EligibilityKey;
use crate::core::EligibilityRecord;
use crate::core::GateDecision;
use crate::core::GateReason;
use crate::core::Timestamp;
use crate::core::time::MILLIS_PER_HOUR;
use crate::interfaces::EligibilityStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: Eligibility Gate
// ============================================================================

/// Default cooldown window, in hours.
pub const DEFAULT_COOLDOWN_HOURS: u32 = 24;
/// Milliseconds per hour for unsigned rounding.
const MILLIS_PER_HOUR_U64: u64 = MILLIS_PER_HOUR.unsigned_abs();

/// Cooldown-window gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityGate {
    /// Window length in milliseconds.
    cooldown_millis: i64,
}

impl Default for EligibilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_COOLDOWN_HOURS)
    }
}

impl EligibilityGate {
    /// Creates a gate with a window of `cooldown_hours`.
    #[must_use]
    pub const fn new(cooldown_hours: u32) -> Self {
        Self {
            cooldown_millis: cooldown_hours as i64 * MILLIS_PER_HOUR,
        }
    }

    /// Returns the window length in milliseconds.
    #[must_use]
    pub const fn cooldown_millis(&self) -> i64 {
        self.cooldown_millis
    }

    /// Records an occurrence and decides whether it counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store fails for a reason other than a
    /// lost race.
    pub fn check<S>(
        &self,
        store: &S,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<GateDecision, StoreError>
    where
        S: EligibilityStore + ?Sized,
    {
        let Some(record) = store.load_eligibility(key)? else {
            return match store.insert_eligibility(&EligibilityRecord::first(key.clone(), now)) {
                Ok(()) => Ok(GateDecision::counted(GateReason::FirstOccurrence)),
                Err(StoreError::Conflict(_)) => Self::repeat(store, key, now),
                Err(err) => Err(err),
            };
        };
        if self.within_window(&record, now) {
            return Self::repeat(store, key, now);
        }
        if store.reset_eligibility(key, record.first_occurrence_at, now)? {
            Ok(GateDecision::counted(GateReason::CooldownExpired))
        } else {
            Self::repeat(store, key, now)
        }
    }

    /// Reports whether the next occurrence would count, without recording anything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when loading fails.
    pub fn status<S>(
        &self,
        store: &S,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<CooldownStatus, StoreError>
    where
        S: EligibilityStore + ?Sized,
    {
        let Some(record) = store.load_eligibility(key)? else {
            return Ok(CooldownStatus {
                can_complete: true,
                reason: CooldownReason::NeverCompleted,
                hours_remaining: None,
            });
        };
        if !self.within_window(&record, now) {
            return Ok(CooldownStatus {
                can_complete: true,
                reason: CooldownReason::CooldownExpired,
                hours_remaining: None,
            });
        }
        let remaining = self.cooldown_millis - now.millis_since(record.first_occurrence_at);
        let remaining = u64::try_from(remaining).unwrap_or(0);
        Ok(CooldownStatus {
            can_complete: false,
            reason: CooldownReason::CooldownActive,
            hours_remaining: Some(remaining.div_ceil(MILLIS_PER_HOUR_U64)),
        })
    }

    /// Returns true while the record's window is open (inclusive bound).
    fn within_window(&self, record: &EligibilityRecord, now: Timestamp) -> bool {
        now.millis_since(record.first_occurrence_at) <= self.cooldown_millis
    }

    /// Records a repeat occurrence and reports it as a duplicate.
    fn repeat<S>(
        store: &S,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<GateDecision, StoreError>
    where
        S: EligibilityStore + ?Sized,
    {
        let count = store
            .record_repeat(key, now)?
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "eligibility record {}/{}",
                    key.target_entity_id, key.event_kind
                ))
            })?;
        Ok(GateDecision::duplicate(count))
    }
}
