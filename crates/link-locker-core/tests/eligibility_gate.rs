// crates/link-locker-core/tests/eligibility_gate.rs
// ============================================================================
// Module: Eligibility Gate Tests
// Description: Cooldown window, per-kind independence, and race handling.
// Purpose: Ensure repeat occurrences never count twice inside one window.
// ============================================================================

//! Eligibility gate tests over the in-memory store.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::sync::Arc;
use std::sync::Barrier;
use std::thread;

use link_locker_core::CooldownReason;
use link_locker_core::EligibilityGate;
use link_locker_core::EligibilityKey;
use link_locker_core::EligibilityRecord;
use link_locker_core::EligibilityStore;
use link_locker_core::EventKind;
use link_locker_core::GateReason;
use link_locker_core::InMemoryLockerStore;
use link_locker_core::LockerId;
use link_locker_core::StoreError;
use link_locker_core::TaskId;
use link_locker_core::Timestamp;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const HOUR: i64 = 3_600_000;
const T0: i64 = 1_700_000_000_000;

fn at(offset_millis: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + offset_millis)
}

fn task_key(ip: &str) -> EligibilityKey {
    EligibilityKey::for_task(ip, &TaskId::new("task-1"))
}

/// Store that hides existing records from the first load, simulating a
/// concurrent writer that inserted between our read and our insert.
struct RacingStore {
    inner: InMemoryLockerStore,
}

impl EligibilityStore for RacingStore {
    fn load_eligibility(
        &self,
        _key: &EligibilityKey,
    ) -> Result<Option<EligibilityRecord>, StoreError> {
        Ok(None)
    }

    fn insert_eligibility(&self, record: &EligibilityRecord) -> Result<(), StoreError> {
        self.inner.insert_eligibility(record)
    }

    fn record_repeat(
        &self,
        key: &EligibilityKey,
        now: Timestamp,
    ) -> Result<Option<u64>, StoreError> {
        self.inner.record_repeat(key, now)
    }

    fn reset_eligibility(
        &self,
        key: &EligibilityKey,
        expected_first: Timestamp,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        self.inner.reset_eligibility(key, expected_first, now)
    }
}

// ============================================================================
// SECTION: Window Semantics
// ============================================================================

#[test]
fn first_occurrence_counts_and_repeat_within_window_does_not() {
    let store = InMemoryLockerStore::new();
    let gate = EligibilityGate::default();
    let key = task_key("10.0.0.1");

    let first = gate.check(&store, &key, at(0)).unwrap();
    assert!(first.should_count);
    assert_eq!(first.reason, GateReason::FirstOccurrence);
    assert_eq!(first.occurrence_count, 1);

    let second = gate.check(&store, &key, at(HOUR)).unwrap();
    assert!(!second.should_count);
    assert_eq!(second.reason, GateReason::DuplicateWithinWindow);
    assert_eq!(second.occurrence_count, 2);

    let record = store.load_eligibility(&key).unwrap().unwrap();
    assert_eq!(record.first_occurrence_at, at(0));
    assert_eq!(record.last_occurrence_at, at(HOUR));
}

#[test]
fn window_bound_is_inclusive_and_expiry_resets_the_record() {
    let store = InMemoryLockerStore::new();
    let gate = EligibilityGate::default();
    let key = task_key("10.0.0.2");

    assert!(gate.check(&store, &key, at(0)).unwrap().should_count);
    let boundary = gate.check(&store, &key, at(24 * HOUR)).unwrap();
    assert!(!boundary.should_count);

    let expired = gate.check(&store, &key, at(24 * HOUR + 1)).unwrap();
    assert!(expired.should_count);
    assert_eq!(expired.reason, GateReason::CooldownExpired);
    let record = store.load_eligibility(&key).unwrap().unwrap();
    assert_eq!(record.first_occurrence_at, at(24 * HOUR + 1));
    assert_eq!(record.last_occurrence_at, at(24 * HOUR + 1));
    assert_eq!(record.occurrence_count, 1);
}

#[test]
fn event_kinds_and_entities_are_gated_independently() {
    let store = InMemoryLockerStore::new();
    let gate = EligibilityGate::default();
    let locker = LockerId::new("locker-1");
    let ip = "10.0.0.3";

    assert!(gate.check(&store, &task_key(ip), at(0)).unwrap().should_count);
    assert!(!gate.check(&store, &task_key(ip), at(1)).unwrap().should_count);

    let visit = EligibilityKey::for_locker(ip, &locker, EventKind::Visit);
    let unlock = EligibilityKey::for_locker(ip, &locker, EventKind::Unlock);
    assert!(gate.check(&store, &visit, at(2)).unwrap().should_count);
    assert!(gate.check(&store, &unlock, at(3)).unwrap().should_count);
    assert!(gate.check(&store, &task_key("10.0.0.4"), at(4)).unwrap().should_count);
}

#[test]
fn custom_cooldown_shortens_the_window() {
    let store = InMemoryLockerStore::new();
    let gate = EligibilityGate::new(1);
    let key = task_key("10.0.0.5");
    assert!(gate.check(&store, &key, at(0)).unwrap().should_count);
    assert!(!gate.check(&store, &key, at(HOUR)).unwrap().should_count);
    assert!(gate.check(&store, &key, at(HOUR + 1)).unwrap().should_count);
}

// ============================================================================
// SECTION: Read-Only Status
// ============================================================================

#[test]
fn status_reports_remaining_hours_without_recording() {
    let store = InMemoryLockerStore::new();
    let gate = EligibilityGate::default();
    let key = task_key("10.0.0.6");

    let fresh = gate.status(&store, &key, at(0)).unwrap();
    assert!(fresh.can_complete);
    assert_eq!(fresh.reason, CooldownReason::NeverCompleted);
    assert!(store.load_eligibility(&key).unwrap().is_none());

    gate.check(&store, &key, at(0)).unwrap();
    let active = gate.status(&store, &key, at(HOUR / 2)).unwrap();
    assert!(!active.can_complete);
    assert_eq!(active.reason, CooldownReason::CooldownActive);
    assert_eq!(active.hours_remaining, Some(24));

    let later = gate.status(&store, &key, at(23 * HOUR)).unwrap();
    assert_eq!(later.hours_remaining, Some(1));
    assert_eq!(store.load_eligibility(&key).unwrap().unwrap().occurrence_count, 1);

    let expired = gate.status(&store, &key, at(25 * HOUR)).unwrap();
    assert!(expired.can_complete);
    assert_eq!(expired.reason, CooldownReason::CooldownExpired);
}

// ============================================================================
// SECTION: Races
// ============================================================================

#[test]
fn lost_insert_race_is_reported_as_duplicate() {
    let store = RacingStore {
        inner: InMemoryLockerStore::new(),
    };
    let gate = EligibilityGate::default();
    let key = task_key("10.0.0.7");

    assert!(gate.check(&store, &key, at(0)).unwrap().should_count);
    let loser = gate.check(&store, &key, at(1)).unwrap();
    assert!(!loser.should_count);
    assert_eq!(loser.reason, GateReason::DuplicateWithinWindow);
    assert_eq!(loser.occurrence_count, 2);
}

#[test]
fn stale_reset_loses_the_compare_and_set() {
    let store = InMemoryLockerStore::new();
    let key = task_key("10.0.0.8");
    store.insert_eligibility(&EligibilityRecord::first(key.clone(), at(0))).unwrap();

    assert!(store.reset_eligibility(&key, at(0), at(25 * HOUR)).unwrap());
    assert!(!store.reset_eligibility(&key, at(0), at(25 * HOUR + 5)).unwrap());
    assert_eq!(store.load_eligibility(&key).unwrap().unwrap().first_occurrence_at, at(25 * HOUR));
}

#[test]
fn concurrent_first_occurrences_count_once() {
    let store = Arc::new(InMemoryLockerStore::new());
    let gate = EligibilityGate::default();
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0 .. threads)
        .map(|_| {
            let store = Arc::clone(&store);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                gate.check(store.as_ref(), &task_key("10.0.0.9"), at(0)).unwrap()
            })
        })
        .collect();
    let decisions: Vec<_> = handles.into_iter().map(|handle| handle.join().unwrap()).collect();
    assert_eq!(decisions.iter().filter(|decision| decision.should_count).count(), 1);
    let record = store.load_eligibility(&task_key("10.0.0.9")).unwrap().unwrap();
    assert_eq!(record.occurrence_count, 8);
}
