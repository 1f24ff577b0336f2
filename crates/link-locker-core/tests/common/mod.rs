// crates/link-locker-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared catalog, visitor, and engine fixtures.
// Purpose: Build deterministic engines over the in-memory store.
// Dependencies: link-locker-core
// ============================================================================

//! ## Overview
//! Fixtures pin time with [`FixedClock`] and keep a handle on the in-memory
//! store so tests can inspect ledger and balance state directly.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use link_locker_core::Browser;
use link_locker_core::CatalogStore;
use link_locker_core::CountryCode;
use link_locker_core::Device;
use link_locker_core::EngineConfig;
use link_locker_core::FixedClock;
use link_locker_core::InMemoryLockerStore;
use link_locker_core::Locker;
use link_locker_core::LockerEngine;
use link_locker_core::Money;
use link_locker_core::SharedLockerStore;
use link_locker_core::Task;
use link_locker_core::Tier;
use link_locker_core::Timestamp;
use link_locker_core::VisitorContext;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Fixed start time for every fixture clock.
pub const START_MILLIS: i64 = 1_700_000_000_000;
/// Publisher owning the fixture locker.
pub const PUBLISHER: &str = "pub-1";
/// Fixture locker id.
pub const LOCKER: &str = "locker-1";
/// Fixture task id.
pub const TASK: &str = "task-1";

/// Engine plus direct handles on its store and clock.
pub struct Harness {
    /// Engine under test.
    pub engine: LockerEngine,
    /// Store shared with the engine.
    pub store: InMemoryLockerStore,
    /// Clock shared with the engine.
    pub clock: Arc<FixedClock>,
}

impl Harness {
    /// Builds a harness with the default configuration.
    pub fn new() -> Self {
        Self::with(InMemoryLockerStore::new(), EngineConfig::default())
    }

    /// Builds a harness over a given store and configuration.
    pub fn with(store: InMemoryLockerStore, config: EngineConfig) -> Self {
        let clock = Arc::new(FixedClock::new(Timestamp::from_unix_millis(START_MILLIS)));
        let engine =
            LockerEngine::new(SharedLockerStore::from_store(store.clone()), clock.clone(), config);
        store.put_task(&task()).unwrap();
        store.put_locker(&locker()).unwrap();
        Self {
            engine,
            store,
            clock,
        }
    }
}

/// Task paying 4.50 / 2.00 / 0.50 CPM with a 30 second dwell time.
pub fn task() -> Task {
    let mut task = Task::new(TASK, "survey");
    task.title = "Fixture survey".to_string();
    task.cpm_tier1 = Money::parse("4.50").unwrap();
    task.cpm_tier2 = Money::parse("2.00").unwrap();
    task.cpm_tier3 = Money::parse("0.50").unwrap();
    task.ad_url = Some("https://ads.example/task".to_string());
    task
}

/// Locker owned by [`PUBLISHER`] accepting every task type.
pub fn locker() -> Locker {
    Locker::new(LOCKER, PUBLISHER, "https://publisher.example/file")
}

/// Desktop Chrome visitor in the US.
pub fn visitor(ip: &str) -> VisitorContext {
    VisitorContext {
        ip_address: ip.to_string(),
        device: Device::Desktop,
        browser: Browser::Chrome,
        country_code: CountryCode::us(),
        tier: Tier::Tier1,
        is_vpn: false,
        is_proxy: false,
    }
}

/// Parses a money literal.
pub fn money(value: &str) -> Money {
    Money::parse(value).unwrap()
}
