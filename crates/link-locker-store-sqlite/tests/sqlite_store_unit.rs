// crates/link-locker-store-sqlite/tests/sqlite_store_unit.rs
// ============================================================================
// Module: SQLite Store Unit Tests
// Description: Targeted tests for the SQLite link locker store.
// Purpose: Validate path safety, schema versioning, uniqueness constraints,
//          balance atomicity, and persistence across reopen.
// ============================================================================

//! ## Overview
//! Unit-level tests for `SQLite` store invariants:
//! - Path safety checks and schema version validation
//! - Eligibility insert conflicts and compare-and-set resets
//! - Processed-postback, conversion, and revenue dedup uniqueness
//! - Atomic balance increments under concurrent writers
//! - Engine scenarios over a durable store

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use link_locker_core::AnalyticsReport;
use link_locker_core::AttributionOutcome;
use link_locker_core::BalanceStore;
use link_locker_core::Browser;
use link_locker_core::CatalogStore;
use link_locker_core::Conversion;
use link_locker_core::CountryCode;
use link_locker_core::Device;
use link_locker_core::DeviceTargetingOverride;
use link_locker_core::EligibilityKey;
use link_locker_core::EligibilityRecord;
use link_locker_core::EligibilityStore;
use link_locker_core::EngineConfig;
use link_locker_core::EventKind;
use link_locker_core::FixedClock;
use link_locker_core::LedgerStore;
use link_locker_core::Locker;
use link_locker_core::LockerEngine;
use link_locker_core::LockerId;
use link_locker_core::Money;
use link_locker_core::OverrideKey;
use link_locker_core::PostbackEvent;
use link_locker_core::PostbackStatus;
use link_locker_core::PublisherId;
use link_locker_core::RecordId;
use link_locker_core::RevenueEvent;
use link_locker_core::RevenueSource;
use link_locker_core::SharedLockerStore;
use link_locker_core::StoreError;
use link_locker_core::Task;
use link_locker_core::TaskId;
use link_locker_core::Tier;
use link_locker_core::Timestamp;
use link_locker_core::VisitorContext;
use link_locker_store_sqlite::SqliteLockerStore;
use link_locker_store_sqlite::SqliteStoreConfig;
use link_locker_store_sqlite::SqliteStoreError;
use rusqlite::Connection;
use rusqlite::params;
use tempfile::TempDir;

// ============================================================================
// SECTION: Helpers
// ============================================================================

const T0: i64 = 1_700_000_000_000;

fn store_path(dir: &TempDir) -> PathBuf {
    dir.path().join("locker.sqlite")
}

fn open(dir: &TempDir) -> SqliteLockerStore {
    SqliteLockerStore::new(SqliteStoreConfig::for_path(store_path(dir))).unwrap()
}

fn at(offset: i64) -> Timestamp {
    Timestamp::from_unix_millis(T0 + offset)
}

fn money(value: &str) -> Money {
    Money::parse(value).unwrap()
}

fn task() -> Task {
    let mut task = Task::new("task-1", "survey");
    task.cpm_tier1 = money("4.50");
    task.ad_url = Some("https://ads.example/task".to_string());
    task
}

fn postback(id: &str, click: &str) -> PostbackEvent {
    PostbackEvent {
        id: RecordId::new(id),
        click_id: click.to_string(),
        task_id: TaskId::new("task-1"),
        status: PostbackStatus::Approved,
        payout: Some(money("2.00")),
        params: BTreeMap::new(),
        processed: false,
        received_at: at(0),
    }
}

fn revenue(id: &str, dedup: Option<&str>, amount: &str) -> RevenueEvent {
    RevenueEvent {
        id: RecordId::new(id),
        publisher_id: PublisherId::new("pub-1"),
        locker_id: Some(LockerId::new("locker-1")),
        task_id: Some(TaskId::new("task-1")),
        amount: money(amount),
        country: Some(CountryCode::us()),
        tier: Some(Tier::Tier1),
        source: RevenueSource::PostbackVerified,
        timestamp: at(0),
        click_id: Some("click-1".to_string()),
        dedup_key: dedup.map(str::to_string),
        postback_id: None,
        conversion_id: None,
    }
}

fn visitor() -> VisitorContext {
    VisitorContext {
        ip_address: "203.0.113.9".to_string(),
        device: Device::Desktop,
        browser: Browser::Firefox,
        country_code: CountryCode::us(),
        tier: Tier::Tier1,
        is_vpn: false,
        is_proxy: false,
    }
}

// ============================================================================
// SECTION: Paths and Schema
// ============================================================================

#[test]
fn sqlite_store_rejects_directory_paths() {
    let dir = TempDir::new().unwrap();
    let result = SqliteLockerStore::new(SqliteStoreConfig::for_path(dir.path()));
    assert!(matches!(result, Err(SqliteStoreError::Invalid(_))));
}

#[test]
fn sqlite_store_rejects_unknown_schema_versions() {
    let dir = TempDir::new().unwrap();
    let path = store_path(&dir);
    {
        let connection = Connection::open(&path).unwrap();
        connection
            .execute_batch("CREATE TABLE store_meta (version INTEGER NOT NULL);")
            .unwrap();
        connection.execute("INSERT INTO store_meta (version) VALUES (?1)", params![99]).unwrap();
    }
    let result = SqliteLockerStore::new(SqliteStoreConfig::for_path(path));
    assert!(matches!(result, Err(SqliteStoreError::VersionMismatch(_))));
}

#[test]
fn sqlite_store_persists_across_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open(&dir);
        store.put_task(&task()).unwrap();
        store.put_locker(&Locker::new("locker-1", "pub-1", "https://dest.example")).unwrap();
        let mut slot = DeviceTargetingOverride::new(Device::Mobile, CountryCode::us());
        slot.cpm = Some(money("9.99"));
        store.save_overrides(&[slot]).unwrap();
        store.set_balance(&PublisherId::new("pub-1"), &money("12.3456")).unwrap();
    }
    let store = open(&dir);
    store.readiness().unwrap();
    assert_eq!(store.get_task(&TaskId::new("task-1")).unwrap(), Some(task()));
    assert!(store.get_locker(&LockerId::new("locker-1")).unwrap().is_some());
    let key = OverrideKey {
        device: Device::Mobile,
        country_code: CountryCode::us(),
    };
    let slot = store.get_override(&key).unwrap().unwrap();
    assert_eq!(slot.cpm, Some(money("9.99")));
    assert!(store.list_overrides(Some(Device::Desktop)).unwrap().is_empty());
    assert_eq!(store.get_balance(&PublisherId::new("pub-1")).unwrap().to_string(), "12.3456");
}

// ============================================================================
// SECTION: Eligibility
// ============================================================================

#[test]
fn sqlite_eligibility_insert_conflicts_and_reset_is_compare_and_set() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let key = EligibilityKey::for_task("10.1.1.1", &TaskId::new("task-1"));
    store.insert_eligibility(&EligibilityRecord::first(key.clone(), at(0))).unwrap();

    let duplicate = store.insert_eligibility(&EligibilityRecord::first(key.clone(), at(5)));
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    assert_eq!(store.record_repeat(&key, at(10)).unwrap(), Some(2));
    let missing = EligibilityKey::for_task("10.1.1.2", &TaskId::new("task-1"));
    assert_eq!(store.record_repeat(&missing, at(10)).unwrap(), None);

    assert!(store.reset_eligibility(&key, at(0), at(100)).unwrap());
    assert!(!store.reset_eligibility(&key, at(0), at(200)).unwrap());
    let record = store.load_eligibility(&key).unwrap().unwrap();
    assert_eq!(record.first_occurrence_at, at(100));
    assert_eq!(record.occurrence_count, 1);
}

// ============================================================================
// SECTION: Ledger Uniqueness
// ============================================================================

#[test]
fn sqlite_only_one_postback_per_click_and_task_is_processed() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.record_inbound_postback(&postback("pb-1", "click-1")).unwrap();
    store.record_inbound_postback(&postback("pb-2", "click-1")).unwrap();

    let credited = revenue("rev-1", Some("k1"), "2");
    store.commit_postback(&RecordId::new("pb-1"), Some(&credited)).unwrap();
    let second = store.commit_postback(&RecordId::new("pb-2"), None);
    assert!(matches!(second, Err(StoreError::Conflict(_))));

    let processed = store.find_processed_postback("click-1", &TaskId::new("task-1")).unwrap();
    assert_eq!(processed.unwrap().id, RecordId::new("pb-1"));
    let missing = store.commit_postback(&RecordId::new("pb-9"), None);
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}

#[test]
fn sqlite_failed_commit_rolls_back_the_processed_flag() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.append_revenue_event(&revenue("rev-0", Some("taken"), "1")).unwrap();
    store.record_inbound_postback(&postback("pb-1", "click-1")).unwrap();

    let result =
        store.commit_postback(&RecordId::new("pb-1"), Some(&revenue("rev-1", Some("taken"), "2")));
    assert!(matches!(result, Err(StoreError::Conflict(_))));
    assert!(store.find_processed_postback("click-1", &TaskId::new("task-1")).unwrap().is_none());
}

#[test]
fn sqlite_conversions_and_revenue_dedup_keys_are_unique() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let conversion = Conversion {
        id: RecordId::new("conv-1"),
        task_id: TaskId::new("task-1"),
        publisher_id: PublisherId::new("pub-1"),
        sub_id: "sub-1".to_string(),
        payout: money("0.0045"),
        status: PostbackStatus::Approved,
        conversion_ip: None,
        created_at: at(0),
    };
    let credited = revenue("rev-1", Some("webhook:sub-1"), "0.0045");
    store.commit_conversion(&conversion, &credited).unwrap();

    let mut again = conversion.clone();
    again.id = RecordId::new("conv-2");
    let duplicate = store.commit_conversion(&again, &revenue("rev-2", Some("other"), "1"));
    assert!(matches!(duplicate, Err(StoreError::Conflict(_))));

    let dup_key = store.append_revenue_event(&revenue("rev-3", Some("webhook:sub-1"), "1"));
    assert!(matches!(dup_key, Err(StoreError::Conflict(_))));
    store.append_revenue_event(&revenue("rev-4", None, "1")).unwrap();
    store.append_revenue_event(&revenue("rev-5", None, "1")).unwrap();

    let events = store.list_revenue_events(&PublisherId::new("pub-1")).unwrap();
    let ids: Vec<&str> = events.iter().map(|event| event.id.as_str()).collect();
    assert_eq!(ids, vec!["rev-1", "rev-4", "rev-5"]);
    assert_eq!(store.find_revenue_by_click("click-1").unwrap().len(), 3);
    assert_eq!(store.find_conversion("sub-1", &TaskId::new("task-1")).unwrap(), Some(conversion));
}

// ============================================================================
// SECTION: Balances
// ============================================================================

#[test]
fn sqlite_concurrent_increments_are_atomic() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(open(&dir));
    let publisher = PublisherId::new("pub-1");
    let handles: Vec<_> = (0 .. 8)
        .map(|_| {
            let store = Arc::clone(&store);
            let publisher = publisher.clone();
            thread::spawn(move || {
                for _ in 0 .. 25 {
                    store.increment_balance(&publisher, &money("0.0045")).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.get_balance(&publisher).unwrap().to_string(), "0.9");
}

// ============================================================================
// SECTION: Engine Over SQLite
// ============================================================================

#[test]
fn sqlite_engine_credits_client_completion_and_rejects_postback_replay() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    store.put_task(&task()).unwrap();
    store.put_locker(&Locker::new("locker-1", "pub-1", "https://dest.example")).unwrap();
    let clock = Arc::new(FixedClock::new(at(0)));
    let engine = LockerEngine::new(
        SharedLockerStore::from_store(store.clone()),
        clock,
        EngineConfig::default(),
    );

    let mut report = AnalyticsReport::new(LockerId::new("locker-1"), EventKind::TaskComplete);
    report.task_id = Some(TaskId::new("task-1"));
    let receipt = engine.record_analytics(&report, &visitor()).unwrap();
    assert!(receipt.counted);
    let repeat = engine.record_analytics(&report, &visitor()).unwrap();
    assert!(!repeat.counted);

    let params: BTreeMap<String, String> = [
        ("click_id", "net-click"),
        ("task_id", "task-1"),
        ("status", "approved"),
        ("payout", "2.00"),
        ("locker_id", "locker-1"),
    ]
    .iter()
    .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
    .collect();
    assert!(matches!(
        engine.process_postback(params.clone()).unwrap(),
        AttributionOutcome::Credited { .. }
    ));
    assert_eq!(engine.process_postback(params).unwrap(), AttributionOutcome::Duplicate);

    let summary = engine.ledger_summary(&PublisherId::new("pub-1")).unwrap();
    assert_eq!(summary.event_count, 2);
    assert_eq!(summary.balance.to_string(), "2.0045");
}
